//! Library side of the `screener` tool: configuration, the latest-bar
//! scanner and the end-to-end backtest/scan pipelines.

pub mod config;
pub mod pipeline;
pub mod scanner;

pub use config::{Config, PathsConfig};
pub use pipeline::{backtest, scan, BacktestRun, ScanRun};
pub use scanner::{run_scan, scan_series, ScanConfig, ScanHit, ScanTally, ScanVerdict};
