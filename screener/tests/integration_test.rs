//! End-to-end runs over a temporary data directory

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use backtesting::NullPolicy;
use screener::{backtest, scan, Config};
use tempfile::tempdir;

/// 130 daily bars with a single ignition signal on bar 90.
fn ignition_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = Vec::with_capacity(130);
    for i in 0..130 {
        let close = match i {
            0..=84 => 100.0 + 0.2 * i as f64,
            85..=89 => closes[i - 1] - 2.0,
            90 => closes[i - 1] + 3.2,
            _ => closes[i - 1] + 0.1,
        };
        closes.push(close);
    }
    closes
}

fn write_series(path: &Path, closes: &[f64], volume_at: impl Fn(usize) -> f64) {
    let mut text = String::from("日期,股票代码,开盘,收盘,最高,最低,成交量,成交额,振幅,涨跌幅,涨跌额,换手率\n");
    let start = chrono::NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    for (i, &close) in closes.iter().enumerate() {
        let open = close - 0.3;
        let date = start + chrono::Days::new(i as u64);
        writeln!(
            text,
            "{},{},{:.4},{:.4},{:.4},{:.4},{},0,0,0,0,1.0",
            date.format("%Y-%m-%d"),
            path.file_stem().unwrap().to_str().unwrap(),
            open,
            close,
            open.max(close) + 0.5,
            open.min(close) - 0.5,
            volume_at(i)
        )
        .unwrap();
    }
    fs::write(path, text).unwrap();
}

fn config_for(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.data_dir = root.join("stock_data");
    config.paths.names_file = root.join("stock_names.csv");
    config.paths.output_dir = root.join("results");
    config.workers = Some(2);
    config
}

#[test]
fn test_backtest_pipeline() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("stock_data");
    fs::create_dir_all(&data).unwrap();

    let closes = ignition_closes();
    write_series(&data.join("600000.csv"), &closes, |i| if i == 90 { 2000.0 } else { 1000.0 });
    write_series(&data.join("600001.csv"), &closes[..99], |_| 1000.0);
    fs::write(data.join("600002.csv"), "not,a,series\n1,2\n").unwrap();
    fs::write(dir.path().join("stock_names.csv"), "code,name\n600000,浦发银行\n").unwrap();

    let config = config_for(dir.path());
    let run = backtest(&config).unwrap();

    assert_eq!(run.tally.instruments(), 3);
    assert_eq!(run.tally.completed, 1);
    assert_eq!(run.tally.skipped, 1);
    assert_eq!(run.tally.failed, 1);
    assert_eq!(run.events.len(), 1);
    assert_eq!(run.events[0].signal_index, 90);
    assert_eq!(run.summary.signal_count, 1);
    assert_eq!(run.summary.policy, NullPolicy::DropNull);
    assert!(run.summary.rows.iter().all(|r| r.sample_count == 1));

    let ledger = fs::read_to_string(&run.ledger_path).unwrap();
    let rows: Vec<&str> = ledger.lines().collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("600000,浦发银行,2022-04-03,"));

    assert!(run.summary_path.exists());
    assert!(run.json_path.exists());

    println!("✓ Backtest pipeline test passed");
    println!("  Signals: {}", run.events.len());
}

#[test]
fn test_zero_input_files_is_fatal() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("stock_data")).unwrap();

    let config = config_for(dir.path());
    let err = backtest(&config).err().unwrap();
    assert!(err.to_string().contains("no *.csv series"));
    assert!(scan(&config).is_err());

    println!("✓ Empty data directory rejected");
}

#[test]
fn test_invalid_config_is_fatal_before_dispatch() {
    let dir = tempdir().unwrap();
    let mut config = config_for(dir.path());
    config.backtest.horizons.clear();
    assert!(backtest(&config).is_err());
    assert!(!dir.path().join("results").exists());
}

#[test]
fn test_scan_pipeline() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("stock_data");
    fs::create_dir_all(&data).unwrap();

    // steady decline into an oversold last bar on shrinking volume
    let falling: Vec<f64> = (0..80)
        .map(|i| if i < 40 { 30.0 } else { 30.0 - 0.4 * (i - 39) as f64 })
        .collect();
    write_series(&data.join("000001.csv"), &falling, |i| if i == 79 { 500.0 } else { 1000.0 });
    write_series(&data.join("000002.csv"), &falling, |_| 1000.0);
    write_series(&data.join("000003.csv"), &falling, |_| 1000.0);
    write_series(&data.join("300001.csv"), &falling, |i| if i == 79 { 500.0 } else { 1000.0 });
    fs::write(
        dir.path().join("stock_names.csv"),
        "code,name\n1,下跌一号\n2,*ST下跌\n3,下跌三号\n",
    )
    .unwrap();

    let config = config_for(dir.path());
    let run = scan(&config).unwrap();

    assert_eq!(run.tally.files, 4);
    assert_eq!(run.tally.excluded_board, 1);
    assert_eq!(run.tally.excluded_name, 1);
    assert_eq!(run.tally.hits, 2);
    assert_eq!(run.hits[0].code, "000001");
    assert_eq!(run.hits[0].tier, "shrinking_volume_ambush");
    assert_eq!(run.hits[1].code, "000003");
    assert_eq!(run.hits[1].tier, "watchlist");

    let output = run.output.unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("下跌一号"));
    assert!(!text.contains("*ST"));
    assert!(!text.contains("300001"));

    println!("✓ Scan pipeline test passed");
}
