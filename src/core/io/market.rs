use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DataError;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// One daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Turnover as a percentage of free float.
    pub turnover: f64,
    /// Close-to-close change in percent.
    pub pct_change: f64,
}

/// Chronologically ordered bars for one instrument.
///
/// Construction sorts by date and collapses repeated dates to their first
/// occurrence, so the series never trusts file order.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSeries {
    id: String,
    bars: Vec<Bar>,
}

impl InstrumentSeries {
    pub fn new(id: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        // stable sort keeps the first row of a repeated date in front
        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);
        Self { id: id.into(), bars }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// One CSV row. Accepts the exchange export headers and plain English ones;
/// columns the engine never reads (amount, amplitude, change) are ignored.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "日期", alias = "date")]
    date: String,
    #[serde(rename = "开盘", alias = "open")]
    open: f64,
    #[serde(rename = "收盘", alias = "close")]
    close: f64,
    #[serde(rename = "最高", alias = "high")]
    high: f64,
    #[serde(rename = "最低", alias = "low")]
    low: f64,
    #[serde(rename = "成交量", alias = "volume")]
    volume: f64,
    #[serde(rename = "换手率", alias = "turnover", default)]
    turnover: Option<f64>,
    #[serde(rename = "涨跌幅", alias = "pct_change", alias = "percent_change", default)]
    pct_change: Option<f64>,
}

/// Parses `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`. A trailing time part is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(day, format).ok())
}

/// Instrument id of a series file: its file stem (`600000.csv` -> `600000`).
pub fn instrument_id_from_path(path: &Path) -> Result<String, DataError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DataError::NoInstrumentId {
            path: path.to_path_buf(),
        })
}

/// Reads one instrument's bar file.
///
/// # Arguments
/// * `path` - CSV file named after the instrument id
///
/// # Returns
/// The series re-sorted chronologically, or the first parse failure
pub fn read_series<P: AsRef<Path>>(path: P) -> Result<InstrumentSeries, DataError> {
    let path = path.as_ref();
    let id = instrument_id_from_path(path)?;
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<RawRow>().enumerate() {
        let raw = record.map_err(csv_error)?;
        let date = parse_date(&raw.date).ok_or_else(|| DataError::InvalidDate {
            path: path.to_path_buf(),
            row: row + 1,
            raw: raw.date.clone(),
        })?;
        bars.push(Bar {
            date,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            turnover: raw.turnover.unwrap_or(f64::NAN),
            pct_change: raw.pct_change.unwrap_or(0.0),
        });
    }

    if bars.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(InstrumentSeries::new(id, bars))
}

/// All `*.csv` files directly inside `dir`, sorted by path.
pub fn list_series_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, DataError> {
    let dir = dir.as_ref();
    let listing_error = |source| DataError::Listing {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(listing_error)? {
        let path = entry.map_err(listing_error)?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
