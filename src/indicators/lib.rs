//! One-pass technical indicators over daily bar series.
//!
//! Every function returns a vector aligned index-for-index with its input.
//! `f64::NAN` marks "not available": inside an indicator's warm-up window,
//! or wherever the window touches a non-finite input. A bad input value only
//! poisons the windows that contain it.
//!
//! # Modules
//!
//! - `trend` - simple and exponential moving averages, MACD
//! - `oscillator` - RSI and KDJ
//! - `volume` - volume ratio against a trailing mean
//! - `window` - rolling extrema with monotonic deques
//! - `frame` - `IndicatorFrame`, the per-instrument bundle a predicate reads

pub mod frame;
pub mod oscillator;
pub mod trend;
pub mod volume;
pub mod window;

pub use frame::{FrameSpec, IndicatorFrame, KDJ_PERIOD, MACD_FAST, MACD_SIGNAL, MACD_SLOW};
pub use oscillator::kdj::{kdj, KdjOutput};
pub use oscillator::rsi::rsi;
pub use trend::ma::{exponential_moving_average, moving_average};
pub use trend::macd::{macd, MacdOutput};
pub use volume::ratio::volume_ratio;
pub use window::{rolling_max, rolling_min};

/// Whether an indicator slot holds a usable value.
#[inline]
pub fn is_available(value: f64) -> bool {
    value.is_finite()
}
