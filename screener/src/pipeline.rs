//! End-to-end runs: discover files, fan out, aggregate, write reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use backtesting::metrics::canonical_order;
use backtesting::report::{write_ledger, write_summary_csv, write_summary_json};
use backtesting::{run_batch, summarize, BatchTally, FanOutCoordinator, SignalEvent, SummaryTable};
use chrono::Local;
use market_io::{list_series_files, NameLookup};
use tracing::{info, warn};

use crate::config::Config;
use crate::scanner::{run_scan, write_scan, ScanHit, ScanTally};

pub const LEDGER_FILE: &str = "signal_ledger.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const SUMMARY_JSON_FILE: &str = "summary.json";

pub struct BacktestRun {
    pub tally: BatchTally,
    pub summary: SummaryTable,
    pub events: Vec<SignalEvent>,
    pub ledger_path: PathBuf,
    pub summary_path: PathBuf,
    pub json_path: PathBuf,
}

pub struct ScanRun {
    pub tally: ScanTally,
    pub hits: Vec<ScanHit>,
    /// Result table, written only when there are hits.
    pub output: Option<PathBuf>,
}

/// Series files to process. No files at all is fatal.
pub fn discover_inputs(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let files = list_series_files(data_dir)?;
    if files.is_empty() {
        anyhow::bail!("no *.csv series found in {}", data_dir.display());
    }
    info!(dir = %data_dir.display(), files = files.len(), "found series files");
    Ok(files)
}

/// The name lookup is decoration only; a missing or broken file leaves
/// every instrument unnamed.
pub fn load_names(path: &Path) -> NameLookup {
    if !path.exists() {
        info!(path = %path.display(), "no name lookup file, instruments stay unnamed");
        return NameLookup::default();
    }
    match NameLookup::from_file(path) {
        Ok(names) => {
            info!(path = %path.display(), names = names.len(), "loaded name lookup");
            names
        }
        Err(e) => {
            warn!(error = %e, "ignoring unreadable name lookup");
            NameLookup::default()
        }
    }
}

pub fn backtest(config: &Config) -> Result<BacktestRun> {
    config.validate()?;
    let files = discover_inputs(&config.paths.data_dir)?;
    let names = load_names(&config.paths.names_file);

    let mut coordinator = FanOutCoordinator::new(config.workers)?;
    let outcomes = run_batch(&mut coordinator, files, Arc::new(config.backtest.clone()));
    let tally = BatchTally::from_outcomes(&outcomes);

    let mut events: Vec<SignalEvent> = outcomes
        .into_iter()
        .flat_map(|item| item.outcome.into_signals())
        .collect();
    events.sort_by(canonical_order);

    let horizons = &config.backtest.horizons;
    let summary = summarize(&events, horizons, config.backtest.null_policy);

    let out = &config.paths.output_dir;
    let ledger_path = out.join(LEDGER_FILE);
    let summary_path = out.join(SUMMARY_FILE);
    let json_path = out.join(SUMMARY_JSON_FILE);
    write_ledger(&events, horizons, &names, &ledger_path)?;
    write_summary_csv(&summary, &summary_path)?;
    write_summary_json(&summary, &tally, &json_path)?;
    info!(ledger = %ledger_path.display(), summary = %summary_path.display(), "reports written");

    Ok(BacktestRun {
        tally,
        summary,
        events,
        ledger_path,
        summary_path,
        json_path,
    })
}

pub fn scan(config: &Config) -> Result<ScanRun> {
    config.validate()?;
    let files = discover_inputs(&config.paths.data_dir)?;
    let names = Arc::new(load_names(&config.paths.names_file));

    let mut coordinator = FanOutCoordinator::new(config.workers)?;
    let (hits, tally) = run_scan(&mut coordinator, files, names, Arc::new(config.scan.clone()));

    let output = if hits.is_empty() {
        None
    } else {
        let path = write_scan(&hits, &config.paths.output_dir, &Local::now())
            .with_context(|| format!("writing scan results to {}", config.paths.output_dir.display()))?;
        info!(path = %path.display(), "scan results written");
        Some(path)
    };

    Ok(ScanRun { tally, hits, output })
}
