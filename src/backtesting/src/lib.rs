//! Walk-forward signal backtesting over daily bar histories.
//!
//! - `config` - `BacktestConfig` and the clamped-return `NullPolicy`
//! - `signals` - condition vocabulary, predicates and signal detection
//! - `core` - per-instrument runner and forward-return evaluation
//! - `parallel` - worker-pool fan-out with per-unit panic isolation
//! - `metrics` - order-independent per-horizon aggregation
//! - `report` - ledger, summary CSV/JSON and the text summary block

pub mod config;
pub mod core;
mod error;
pub mod metrics;
pub mod models;
pub mod parallel;
pub mod report;
pub mod signals;

pub use config::{BacktestConfig, NullPolicy};
pub use self::core::{evaluate_signal, forward_returns, run_instrument};
pub use error::BacktestError;
pub use metrics::{summarize, HorizonAccumulator, SummaryTable};
pub use models::{
    BatchTally, ForwardReturn, InstrumentOutcome, RunOutcome, SignalEvent, SkipReason, StatisticsRow,
};
pub use parallel::{run_batch, CoordinatorState, FanOutCoordinator, SeriesSource, UnitResult};
pub use signals::{detect_signals, Condition, Predicate};
