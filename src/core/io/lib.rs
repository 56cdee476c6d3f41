//! Market data I/O for per-instrument daily bar files.
//!
//! - `market` - `Bar`, `InstrumentSeries` and the CSV series reader
//! - `names` - instrument id to display-name lookup
//! - `write` - delimited writers that emit a UTF-8 BOM

mod error;
pub mod market;
pub mod names;
pub mod write;

pub use error::DataError;
pub use market::{instrument_id_from_path, list_series_files, parse_date, read_series, Bar, InstrumentSeries};
pub use names::{normalize_code, NameLookup};
pub use write::{create_bom_csv, ensure_parent_dir, UTF8_BOM};
