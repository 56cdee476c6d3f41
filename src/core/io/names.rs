use std::path::Path;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::DataError;

/// Width of exchange instrument codes; shorter numeric codes are zero-padded.
const CODE_WIDTH: usize = 6;

#[derive(Debug, Deserialize)]
struct NameRow {
    #[serde(alias = "代码")]
    code: String,
    #[serde(alias = "名称")]
    name: String,
}

/// Instrument id to display-name mapping. Decoration only.
#[derive(Debug, Clone, Default)]
pub struct NameLookup {
    names: FxHashMap<String, String>,
}

impl NameLookup {
    /// Loads a `code,name` CSV.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let csv_error = |source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_error)?;

        let mut lookup = Self::default();
        for record in reader.deserialize::<NameRow>() {
            let row = record.map_err(csv_error)?;
            lookup.insert(&row.code, row.name);
        }
        Ok(lookup)
    }

    pub fn insert(&mut self, code: &str, name: impl Into<String>) {
        self.names.insert(normalize_code(code), name.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(&normalize_code(id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Left-pads all-digit codes to six characters; other ids pass through trimmed.
pub fn normalize_code(raw: &str) -> String {
    let code = raw.trim();
    if !code.is_empty() && code.len() < CODE_WIDTH && code.bytes().all(|b| b.is_ascii_digit()) {
        format!("{code:0>CODE_WIDTH$}")
    } else {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("1"), "000001");
        assert_eq!(normalize_code(" 600519 "), "600519");
        assert_eq!(normalize_code("AAPL"), "AAPL");
        assert_eq!(normalize_code(""), "");
    }

    #[test]
    fn test_lookup_from_file_pads_codes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stock_names.csv");
        fs::write(&path, "code,name\n1,平安银行\n600519,贵州茅台\n").unwrap();

        let names = NameLookup::from_file(&path).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.get("000001"), Some("平安银行"));
        assert_eq!(names.get("1"), Some("平安银行"));
        assert_eq!(names.get("600519"), Some("贵州茅台"));
        assert_eq!(names.get("000002"), None);
    }

    #[test]
    fn test_lookup_accepts_chinese_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("names.csv");
        fs::write(&path, "代码,名称\n000002,万科A\n").unwrap();

        let names = NameLookup::from_file(&path).unwrap();
        assert_eq!(names.get("000002"), Some("万科A"));
    }
}
