use market_io::DataError;
use thiserror::Error;

/// Failures a backtest run can report.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("cannot build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
