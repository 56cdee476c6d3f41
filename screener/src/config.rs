//! Configuration for the screener binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backtesting::BacktestConfig;
use serde::{Deserialize, Serialize};

use crate::scanner::ScanConfig;

/// Top-level configuration. Every section has defaults, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Worker threads; the available parallelism when unset.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub backtest: BacktestConfig,

    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of per-instrument `<id>.csv` files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// `code,name` lookup; optional on disk
    #[serde(default = "default_names_file")]
    pub names_file: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("stock_data")
}

fn default_names_file() -> PathBuf {
    PathBuf::from("stock_names.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            names_file: default_names_file(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            paths: PathsConfig::default(),
            backtest: BacktestConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            anyhow::bail!("workers must be greater than 0");
        }
        self.backtest.validate().context("invalid [backtest] section")?;
        self.scan.validate().context("invalid [scan] section")?;
        Ok(())
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
