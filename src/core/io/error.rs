use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading or writing market data files.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} row {row}: unrecognised date '{raw}'", path.display())]
    InvalidDate { path: PathBuf, row: usize, raw: String },

    #[error("{} contains no bars", path.display())]
    Empty { path: PathBuf },

    #[error("cannot derive an instrument id from {}", path.display())]
    NoInstrumentId { path: PathBuf },

    #[error("cannot list {}: {source}", path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
