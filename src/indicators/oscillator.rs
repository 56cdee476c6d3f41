//! Bounded oscillators.

pub mod kdj;
pub mod rsi;
