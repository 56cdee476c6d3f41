use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use market_io::{create_bom_csv, ensure_parent_dir, NameLookup};
use serde::Serialize;

use crate::metrics::SummaryTable;
use crate::models::{BatchTally, SignalEvent};

/// Display name used when the lookup has no entry for an instrument.
pub const UNKNOWN_NAME: &str = "unknown";

fn fmt_opt(value: Option<f64>, scale: f64) -> String {
    value.map_or_else(String::new, |v| format!("{:.2}", v * scale))
}

/// Writes one row per signal: code, name, signal date, entry price, one
/// return column per horizon and the list of clamped horizons.
pub fn write_ledger<P: AsRef<Path>>(
    events: &[SignalEvent],
    horizons: &[usize],
    names: &NameLookup,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create_bom_csv(path)
        .with_context(|| format!("creating ledger {}", path.display()))?;

    let mut header = vec![
        "code".to_string(),
        "name".to_string(),
        "signal_date".to_string(),
        "entry_price".to_string(),
    ];
    header.extend(horizons.iter().map(|h| format!("return_{h}d_pct")));
    header.push("clamped_horizons".to_string());
    writer.write_record(&header)?;

    for event in events {
        let mut record = vec![
            event.instrument_id.clone(),
            names.get(&event.instrument_id).unwrap_or(UNKNOWN_NAME).to_string(),
            event.signal_date.format("%Y-%m-%d").to_string(),
            format!("{:.2}", event.entry_price),
        ];
        record.extend(horizons.iter().map(|h| match event.returns.get(h) {
            Some(r) if r.is_clamped() => String::new(),
            Some(r) => format!("{:.2}", r.value()),
            None => String::new(),
        }));
        let clamped: Vec<String> = event.clamped_horizons().iter().map(usize::to_string).collect();
        record.push(clamped.join(";"));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes the per-horizon summary. Rates and returns are in percent.
pub fn write_summary_csv<P: AsRef<Path>>(summary: &SummaryTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create_bom_csv(path)
        .with_context(|| format!("creating summary {}", path.display()))?;

    writer.write_record([
        "horizon_days",
        "win_rate_pct",
        "average_return_pct",
        "sample_count",
        "clamped_count",
        "null_policy",
    ])?;
    let policy = summary.policy.to_string();
    for row in &summary.rows {
        writer.write_record([
            row.horizon.to_string(),
            fmt_opt(row.win_rate, 100.0),
            fmt_opt(row.average_return, 1.0),
            row.sample_count.to_string(),
            row.clamped_count.to_string(),
            policy.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    tally: &'a BatchTally,
    summary: &'a SummaryTable,
}

/// Generate a JSON report
pub fn write_summary_json<P: AsRef<Path>>(
    summary: &SummaryTable,
    tally: &BatchTally,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &JsonReport { tally, summary })?;
    Ok(())
}

/// Human-readable summary block.
pub fn format_summary(summary: &SummaryTable, tally: &BatchTally) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Backtest Summary");
    let _ = writeln!(out, "================");
    let _ = writeln!(
        out,
        "Instruments: {} (completed {}, skipped {}, failed {})",
        tally.instruments(),
        tally.completed,
        tally.skipped,
        tally.failed
    );
    let _ = writeln!(out, "Signals:     {}", summary.signal_count);
    let _ = writeln!(out, "Null policy: {}", summary.policy);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>8} {:>10} {:>12} {:>8} {:>8}",
        "horizon", "win_rate%", "avg_return%", "samples", "clamped"
    );
    for row in &summary.rows {
        let _ = writeln!(
            out,
            "{:>7}d {:>10} {:>12} {:>8} {:>8}",
            row.horizon,
            dash_if_empty(fmt_opt(row.win_rate, 100.0)),
            dash_if_empty(fmt_opt(row.average_return, 1.0)),
            row.sample_count,
            row.clamped_count
        );
    }
    out
}

fn dash_if_empty(s: String) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NullPolicy;
    use crate::metrics::summarize;
    use crate::models::ForwardReturn;
    use chrono::NaiveDate;
    use market_io::UTF8_BOM;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn events() -> Vec<SignalEvent> {
        let returns: BTreeMap<usize, ForwardReturn> = [
            (1, ForwardReturn::Value(1.25)),
            (3, ForwardReturn::Clamped),
            (5, ForwardReturn::Value(-0.5)),
        ]
        .into_iter()
        .collect();
        vec![SignalEvent {
            instrument_id: "000001".into(),
            signal_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            signal_index: 77,
            entry_price: 10.456,
            returns,
        }]
    }

    #[test]
    fn test_ledger_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/ledger.csv");
        let mut names = NameLookup::default();
        names.insert("1", "平安银行");

        write_ledger(&events(), &[1, 3, 5], &names, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "code,name,signal_date,entry_price,return_1d_pct,return_3d_pct,return_5d_pct,clamped_horizons"
        );
        assert_eq!(lines[1], "000001,平安银行,2024-05-06,10.46,1.25,,-0.50,3");
    }

    #[test]
    fn test_summary_outputs() {
        let dir = tempdir().unwrap();
        let summary = summarize(&events(), &[1, 3, 5], NullPolicy::DropNull);
        let tally = BatchTally {
            completed: 1,
            signals: 1,
            ..BatchTally::default()
        };

        let csv_path = dir.path().join("summary.csv");
        write_summary_csv(&summary, &csv_path).unwrap();
        let text = fs::read_to_string(&csv_path).unwrap();
        assert!(text.contains("1,100.00,1.25,1,0,drop_null"));
        assert!(text.contains("3,,,0,1,drop_null"));

        let json_path = dir.path().join("summary.json");
        write_summary_json(&summary, &tally, &json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(value["summary"]["policy"], "drop_null");
        assert_eq!(value["tally"]["signals"], 1);

        let block = format_summary(&summary, &tally);
        assert!(block.contains("Null policy: drop_null"));
        assert!(block.contains("Signals:     1"));
    }
}
