use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::DataError;

/// Byte-order mark written ahead of every delimited report so spreadsheet
/// tools decode non-ASCII display names as UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Creates the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match path.as_ref().parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Opens a CSV writer on `path`, creating parent directories and writing
/// the UTF-8 BOM first.
pub fn create_bom_csv<P: AsRef<Path>>(path: P) -> Result<csv::Writer<BufWriter<File>>, DataError> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(UTF8_BOM)?;
    Ok(csv::Writer::from_writer(out))
}
