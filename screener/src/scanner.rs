//! Latest-bar screener.
//!
//! Each instrument's final bar runs through the gates (board and name
//! exclusions, history length, price band, average turnover) and then
//! through an ordered list of tiers. The instrument is reported under the first tier whose
//! predicate holds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use backtesting::report::UNKNOWN_NAME;
use backtesting::{Condition, FanOutCoordinator, Predicate};
use chrono::{DateTime, Local};
use indicators::{FrameSpec, IndicatorFrame};
use market_io::{create_bom_csv, instrument_id_from_path, read_series, InstrumentSeries, NameLookup};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const RSI_FAST: usize = 6;
const RSI_SLOW: usize = 14;
const MA_SHORT: usize = 5;
const MA_LONG: usize = 60;
const VOLUME_LOOKBACK: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Instruments with fewer bars are not scanned.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    /// Price gate: last close must be at least this.
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Upper end of the price band; unset means no cap.
    #[serde(default)]
    pub max_price: Option<f64>,

    /// Turnover gate: rolling mean turnover% must not exceed this.
    #[serde(default = "default_max_avg_turnover")]
    pub max_avg_turnover: f64,

    #[serde(default = "default_turnover_period")]
    pub turnover_period: usize,

    /// Display-name substrings that exclude an instrument, case-insensitive.
    #[serde(default = "default_exclude_name_patterns")]
    pub exclude_name_patterns: Vec<String>,

    /// Code prefixes of excluded boards (ChiNext, STAR, BSE).
    #[serde(default = "default_exclude_code_prefixes")]
    pub exclude_code_prefixes: Vec<String>,

    /// Ordered tiers; the first match wins.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<Predicate>,
}

fn default_min_bars() -> usize {
    60
}

fn default_min_price() -> f64 {
    5.0
}

fn default_max_avg_turnover() -> f64 {
    2.5
}

fn default_turnover_period() -> usize {
    30
}

fn default_exclude_name_patterns() -> Vec<String> {
    vec!["ST".to_string(), "退".to_string()]
}

fn default_exclude_code_prefixes() -> Vec<String> {
    ["30", "68", "4", "8"].iter().map(|p| p.to_string()).collect()
}

fn oversold() -> Vec<Condition> {
    vec![
        Condition::RsiAtMost {
            period: RSI_FAST,
            threshold: 25.0,
        },
        Condition::RsiAtMost {
            period: RSI_SLOW,
            threshold: 35.0,
        },
        Condition::KdjKAtMost { threshold: 30.0 },
    ]
}

fn tier(name: &str, extra: Vec<Condition>) -> Predicate {
    let mut conditions = oversold();
    conditions.extend(extra);
    Predicate::new(name, conditions)
}

/// Oversold on RSI6, RSI14 and KDJ K, then, from strongest to weakest:
/// MA resonance ignition, KDJ/MACD golden cross, shrinking-volume ambush
/// below MA60, and a watchlist of deep MA60 discounts.
pub fn default_tiers() -> Vec<Predicate> {
    vec![
        tier(
            "ma_resonance_ignition",
            vec![
                Condition::CloseAboveMa { period: MA_SHORT },
                Condition::MacdImproving,
                Condition::MaRising { period: MA_SHORT },
                Condition::VolumeRatioAbove {
                    lookback: VOLUME_LOOKBACK,
                    threshold: 0.5,
                },
            ],
        ),
        tier(
            "golden_cross_resonance",
            vec![Condition::KdjGoldenCross, Condition::MacdImproving],
        ),
        tier(
            "shrinking_volume_ambush",
            vec![
                Condition::VolumeRatioBetween {
                    lookback: VOLUME_LOOKBACK,
                    min: 0.2,
                    max: 0.85,
                },
                Condition::ChangeWithin { max_abs: 1.5 },
                Condition::MaDiscountAtLeast {
                    period: MA_LONG,
                    percent: 15.0,
                },
            ],
        ),
        tier(
            "watchlist",
            vec![Condition::MaDiscountAtLeast {
                period: MA_LONG,
                percent: 10.0,
            }],
        ),
    ]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_bars: default_min_bars(),
            min_price: default_min_price(),
            max_price: None,
            max_avg_turnover: default_max_avg_turnover(),
            turnover_period: default_turnover_period(),
            exclude_name_patterns: default_exclude_name_patterns(),
            exclude_code_prefixes: default_exclude_code_prefixes(),
            tiers: default_tiers(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_bars == 0 {
            anyhow::bail!("scan.min_bars must be greater than 0");
        }
        if self.turnover_period == 0 {
            anyhow::bail!("scan.turnover_period must be greater than 0");
        }
        if let Some(max) = self.max_price {
            if !(max >= self.min_price) {
                anyhow::bail!(
                    "scan.max_price ({max}) must not be below scan.min_price ({})",
                    self.min_price
                );
            }
        }
        if self.tiers.is_empty() {
            anyhow::bail!("scan.tiers must list at least one tier");
        }
        for tier in &self.tiers {
            tier.validate().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }

    /// Everything the tiers read, plus the series shown in the result table.
    pub fn frame_spec(&self) -> FrameSpec {
        let mut spec = FrameSpec::default()
            .with_rsi(RSI_FAST)
            .with_rsi(RSI_SLOW)
            .with_ma(MA_SHORT)
            .with_ma(MA_LONG)
            .with_volume_ratio(VOLUME_LOOKBACK)
            .with_turnover(self.turnover_period)
            .with_kdj()
            .with_macd();
        for tier in &self.tiers {
            spec.merge(&tier.frame_spec());
        }
        spec
    }

    fn excludes_code(&self, code: &str) -> bool {
        self.exclude_code_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && code.starts_with(prefix.as_str()))
    }

    fn price_in_band(&self, close: f64) -> bool {
        close >= self.min_price && self.max_price.is_none_or(|max| close <= max)
    }

    fn excludes_name(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.exclude_name_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && upper.contains(&pattern.to_uppercase()))
    }
}

/// One instrument that passed the gates and matched a tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanHit {
    /// Position of the matched tier, 0 = strongest.
    pub tier_rank: usize,
    pub tier: String,
    pub code: String,
    pub name: String,
    pub close: f64,
    pub volume_ratio: Option<f64>,
    pub rsi_fast: Option<f64>,
    pub rsi_slow: Option<f64>,
    pub kdj_golden_cross: bool,
    pub ma_short_rising: bool,
    /// Percent from close up to MA60.
    pub ma_long_discount: Option<f64>,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanVerdict {
    Hit(ScanHit),
    ExcludedBoard,
    ExcludedName,
    TooShort,
    FailedPrice,
    FailedTurnover,
    NoTier,
    Unreadable(String),
}

/// Per-gate rejection counts for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanTally {
    pub files: usize,
    /// Instruments that reached the price gate.
    pub scanned: usize,
    pub excluded_board: usize,
    pub excluded_name: usize,
    pub too_short: usize,
    pub fail_price: usize,
    pub fail_turnover: usize,
    pub no_tier: usize,
    pub unreadable: usize,
    pub hits: usize,
}

impl ScanTally {
    pub fn record(&mut self, verdict: &ScanVerdict) {
        self.files += 1;
        match verdict {
            ScanVerdict::ExcludedBoard => self.excluded_board += 1,
            ScanVerdict::ExcludedName => self.excluded_name += 1,
            ScanVerdict::TooShort => self.too_short += 1,
            ScanVerdict::Unreadable(_) => self.unreadable += 1,
            ScanVerdict::FailedPrice => {
                self.scanned += 1;
                self.fail_price += 1;
            }
            ScanVerdict::FailedTurnover => {
                self.scanned += 1;
                self.fail_turnover += 1;
            }
            ScanVerdict::NoTier => {
                self.scanned += 1;
                self.no_tier += 1;
            }
            ScanVerdict::Hit(_) => {
                self.scanned += 1;
                self.hits += 1;
            }
        }
    }
}

/// Screens the last bar of `series`.
pub fn scan_series(
    series: &InstrumentSeries,
    name: &str,
    config: &ScanConfig,
    spec: &FrameSpec,
) -> ScanVerdict {
    if config.excludes_code(series.id()) {
        return ScanVerdict::ExcludedBoard;
    }
    if config.excludes_name(name) {
        return ScanVerdict::ExcludedName;
    }
    if series.len() < config.min_bars {
        return ScanVerdict::TooShort;
    }
    let bars = series.bars();
    let i = bars.len() - 1;
    let last = bars[i];

    if !config.price_in_band(last.close) {
        return ScanVerdict::FailedPrice;
    }

    let frame = IndicatorFrame::compute(bars, spec);
    // An unknown average turnover does not fail the gate.
    if frame
        .turnover_avg(config.turnover_period, i)
        .is_some_and(|avg| avg > config.max_avg_turnover)
    {
        return ScanVerdict::FailedTurnover;
    }

    let Some((rank, matched)) = config
        .tiers
        .iter()
        .enumerate()
        .find(|(_, tier)| tier.holds(bars, &frame, i))
    else {
        return ScanVerdict::NoTier;
    };

    let ma_long_discount = frame
        .ma(MA_LONG, i)
        .map(|ma| (ma - last.close) / last.close * 100.0);

    ScanVerdict::Hit(ScanHit {
        tier_rank: rank,
        tier: matched.name.clone(),
        code: series.id().to_string(),
        name: name.to_string(),
        close: last.close,
        volume_ratio: frame.volume_ratio(VOLUME_LOOKBACK, i),
        rsi_fast: frame.rsi(RSI_FAST, i),
        rsi_slow: frame.rsi(RSI_SLOW, i),
        kdj_golden_cross: Condition::KdjGoldenCross.holds(bars, &frame, i),
        ma_short_rising: Condition::MaRising { period: MA_SHORT }.holds(bars, &frame, i),
        ma_long_discount,
        change_pct: last.pct_change,
    })
}

/// Strongest tier first; within a tier, deepest MA60 discount first.
pub fn sort_hits(hits: &mut [ScanHit]) {
    hits.sort_by(|a, b| {
        a.tier_rank
            .cmp(&b.tier_rank)
            .then_with(|| {
                let key = |h: &ScanHit| h.ma_long_discount.unwrap_or(f64::NEG_INFINITY);
                key(b).total_cmp(&key(a))
            })
            .then_with(|| a.code.cmp(&b.code))
    });
}

/// Screens every file on the coordinator's pool.
pub fn run_scan(
    coordinator: &mut FanOutCoordinator,
    files: Vec<PathBuf>,
    names: Arc<NameLookup>,
    config: Arc<ScanConfig>,
) -> (Vec<ScanHit>, ScanTally) {
    let spec = Arc::new(config.frame_spec());
    info!(files = files.len(), tiers = config.tiers.len(), "scan started");

    let results = coordinator.run(files, move |path: PathBuf| {
        let code = match instrument_id_from_path(&path) {
            Ok(code) => code,
            Err(e) => return ScanVerdict::Unreadable(e.to_string()),
        };
        if config.excludes_code(&code) {
            return ScanVerdict::ExcludedBoard;
        }
        let name = names.get(&code).unwrap_or(UNKNOWN_NAME);
        if config.excludes_name(name) {
            return ScanVerdict::ExcludedName;
        }
        match read_series(&path) {
            Ok(series) => scan_series(&series, name, &config, &spec),
            Err(e) => ScanVerdict::Unreadable(e.to_string()),
        }
    });

    let mut tally = ScanTally::default();
    let mut hits = Vec::new();
    for result in results {
        let verdict = result.outcome.unwrap_or_else(ScanVerdict::Unreadable);
        tally.record(&verdict);
        match verdict {
            ScanVerdict::Hit(hit) => hits.push(hit),
            ScanVerdict::Unreadable(reason) => warn!(unit = result.index, %reason, "scan unit failed"),
            other => debug!(unit = result.index, verdict = ?other, "rejected"),
        }
    }
    coordinator.finish();
    sort_hits(&mut hits);

    info!(
        scanned = tally.scanned,
        hits = tally.hits,
        fail_price = tally.fail_price,
        fail_turnover = tally.fail_turnover,
        "scan finished"
    );
    (hits, tally)
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(String::new, |v| format!("{v:.decimals$}"))
}

/// File name for a scan taken at `now`.
pub fn scan_file_name(now: &DateTime<Local>) -> String {
    format!("scan_{}.csv", now.format("%Y%m%d_%H%M"))
}

/// Writes the hit table into `dir` under a timestamped name.
pub fn write_scan<P: AsRef<Path>>(hits: &[ScanHit], dir: P, now: &DateTime<Local>) -> Result<PathBuf> {
    let path = dir.as_ref().join(scan_file_name(now));
    let mut writer = create_bom_csv(&path).with_context(|| format!("creating {}", path.display()))?;

    writer.write_record([
        "tier",
        "code",
        "name",
        "close",
        "volume_ratio",
        "indicator_state",
        "rsi6/14",
        "ma60_discount_pct",
        "change_pct",
    ])?;
    for hit in hits {
        let state = format!(
            "{}/{}",
            if hit.kdj_golden_cross { "golden_cross" } else { "bottom" },
            if hit.ma_short_rising { "ma5_up" } else { "ma5_down" }
        );
        writer.write_record([
            format!("{}-{}", hit.tier_rank, hit.tier),
            hit.code.clone(),
            hit.name.clone(),
            format!("{:.2}", hit.close),
            fmt_opt(hit.volume_ratio, 2),
            state,
            format!("{}/{}", fmt_opt(hit.rsi_fast, 1), fmt_opt(hit.rsi_slow, 1)),
            fmt_opt(hit.ma_long_discount, 1),
            format!("{:.1}", hit.change_pct),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Text block printed after a scan.
pub fn format_scan(hits: &[ScanHit], tally: &ScanTally) -> String {
    let mut out = format!(
        "Scan: {} files, {} scanned, {} hits\n  rejected: board {}, name {}, short {}, price {}, turnover {}, no tier {}, unreadable {}\n",
        tally.files,
        tally.scanned,
        tally.hits,
        tally.excluded_board,
        tally.excluded_name,
        tally.too_short,
        tally.fail_price,
        tally.fail_turnover,
        tally.no_tier,
        tally.unreadable
    );
    for hit in hits {
        out.push_str(&format!(
            "  {:<26} {:<8} {:<10} close {:>8.2}  ma60 {:>6}%\n",
            format!("{}-{}", hit.tier_rank, hit.tier),
            hit.code,
            hit.name,
            hit.close,
            fmt_opt(hit.ma_long_discount, 1)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use market_io::Bar;

    /// Long decline into a deeply oversold final bar: low RSI, K near the
    /// bottom, close well below MA60, quiet volume.
    fn oversold_series(id: &str, last_volume: f64) -> InstrumentSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let n = 80;
        let bars = (0..n)
            .map(|i| {
                let close = if i < 40 { 30.0 } else { 30.0 - 0.4 * (i - 39) as f64 };
                Bar {
                    date: start + chrono::Days::new(i as u64),
                    open: close + 0.1,
                    high: close + 0.3,
                    low: close - 0.3,
                    close,
                    volume: if i == n - 1 { last_volume } else { 1000.0 },
                    turnover: 1.0,
                    pct_change: if i < 40 { 0.0 } else { -1.4 },
                }
            })
            .collect();
        InstrumentSeries::new(id, bars)
    }

    #[test]
    fn test_default_tiers_validate() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers.len(), 4);
        assert_eq!(config.tiers[0].name, "ma_resonance_ignition");
    }

    #[test]
    fn test_name_exclusion_case_insensitive() {
        let config = ScanConfig::default();
        assert!(config.excludes_name("*ST海润"));
        assert!(config.excludes_name("st长油"));
        assert!(config.excludes_name("退市大控"));
        assert!(!config.excludes_name("贵州茅台"));
    }

    #[test]
    fn test_gates_in_order() {
        let config = ScanConfig::default();
        let spec = config.frame_spec();

        let short = InstrumentSeries::new("1", oversold_series("1", 500.0).bars()[..59].to_vec());
        assert_eq!(scan_series(&short, "x", &config, &spec), ScanVerdict::TooShort);

        let mut cheap = ScanConfig::default();
        cheap.min_price = 100.0;
        assert_eq!(
            scan_series(&oversold_series("2", 500.0), "x", &cheap, &spec),
            ScanVerdict::FailedPrice
        );

        let mut busy = ScanConfig::default();
        busy.max_avg_turnover = 0.5;
        assert_eq!(
            scan_series(&oversold_series("3", 500.0), "x", &busy, &spec),
            ScanVerdict::FailedTurnover
        );
    }

    #[test]
    fn test_board_and_price_band_gates() {
        let config = ScanConfig::default();
        let spec = config.frame_spec();

        for code in ["300750", "688981", "430047", "830799"] {
            assert_eq!(
                scan_series(&oversold_series(code, 500.0), "x", &config, &spec),
                ScanVerdict::ExcludedBoard,
                "{code} should be excluded by board"
            );
        }
        assert!(matches!(
            scan_series(&oversold_series("000001", 500.0), "x", &config, &spec),
            ScanVerdict::Hit(_)
        ));

        // last close is 14.0
        let mut capped = ScanConfig::default();
        capped.max_price = Some(12.0);
        assert_eq!(
            scan_series(&oversold_series("000001", 500.0), "x", &capped, &spec),
            ScanVerdict::FailedPrice
        );
        capped.max_price = Some(20.0);
        assert!(matches!(
            scan_series(&oversold_series("000001", 500.0), "x", &capped, &spec),
            ScanVerdict::Hit(_)
        ));

        let mut open_boards = ScanConfig::default();
        open_boards.exclude_code_prefixes.clear();
        assert!(matches!(
            scan_series(&oversold_series("300750", 500.0), "x", &open_boards, &spec),
            ScanVerdict::Hit(_)
        ));
    }

    #[test]
    fn test_inverted_price_band_rejected() {
        let mut config = ScanConfig::default();
        config.max_price = Some(4.0);
        assert!(config.validate().is_err());
        config.max_price = Some(5.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_first_matching_tier_wins() {
        let config = ScanConfig::default();
        let spec = config.frame_spec();
        let series = oversold_series("600000", 500.0);

        let verdict = scan_series(&series, "测试", &config, &spec);
        let ScanVerdict::Hit(hit) = verdict else {
            panic!("expected a hit, got {verdict:?}");
        };
        // falling closes keep MA5 above close, so tier 0 cannot match;
        // no KDJ cross rules out tier 1; volume ratio 0.5 and MA60 discount
        // put it in the ambush tier even though the watchlist also matches.
        assert_eq!(hit.tier_rank, 2);
        assert_eq!(hit.tier, "shrinking_volume_ambush");
        assert!(hit.ma_long_discount.unwrap() >= 15.0);
        assert!(!hit.kdj_golden_cross);
    }

    #[test]
    fn test_watchlist_when_volume_not_shrinking() {
        let config = ScanConfig::default();
        let spec = config.frame_spec();
        let verdict = scan_series(&oversold_series("600000", 1000.0), "测试", &config, &spec);
        let ScanVerdict::Hit(hit) = verdict else {
            panic!("expected a hit, got {verdict:?}");
        };
        assert_eq!(hit.tier, "watchlist");
    }

    #[test]
    fn test_no_tier_for_calm_series() {
        let config = ScanConfig::default();
        let spec = config.frame_spec();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let bars = (0..80)
            .map(|i| Bar {
                date: start + chrono::Days::new(i),
                open: 20.0,
                high: 20.5,
                low: 19.5,
                close: 20.0,
                volume: 1000.0,
                turnover: 1.0,
                pct_change: 0.0,
            })
            .collect();
        let flat = InstrumentSeries::new("000001", bars);
        assert_eq!(scan_series(&flat, "平安银行", &config, &spec), ScanVerdict::NoTier);
    }

    #[test]
    fn test_tally_counts_each_gate() {
        let mut tally = ScanTally::default();
        for verdict in [
            ScanVerdict::ExcludedBoard,
            ScanVerdict::ExcludedName,
            ScanVerdict::TooShort,
            ScanVerdict::FailedPrice,
            ScanVerdict::FailedPrice,
            ScanVerdict::FailedTurnover,
            ScanVerdict::NoTier,
            ScanVerdict::Unreadable("bad".into()),
        ] {
            tally.record(&verdict);
        }
        assert_eq!(tally.files, 8);
        assert_eq!(tally.excluded_board, 1);
        assert_eq!(tally.excluded_name, 1);
        assert_eq!(tally.scanned, 4);
        assert_eq!(tally.fail_price, 2);
        assert_eq!(tally.fail_turnover, 1);
        assert_eq!(tally.hits, 0);
    }

    #[test]
    fn test_sort_hits_by_tier_then_discount() {
        let base = ScanHit {
            tier_rank: 3,
            tier: "watchlist".into(),
            code: "a".into(),
            name: "n".into(),
            close: 10.0,
            volume_ratio: None,
            rsi_fast: None,
            rsi_slow: None,
            kdj_golden_cross: false,
            ma_short_rising: false,
            ma_long_discount: Some(11.0),
            change_pct: 0.0,
        };
        let mut hits = vec![
            base.clone(),
            ScanHit {
                code: "b".into(),
                ma_long_discount: Some(30.0),
                ..base.clone()
            },
            ScanHit {
                code: "c".into(),
                tier_rank: 0,
                ma_long_discount: None,
                ..base.clone()
            },
        ];
        sort_hits(&mut hits);
        let codes: Vec<&str> = hits.iter().map(|h| h.code.as_str()).collect();
        assert_eq!(codes, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_scan_file_name() {
        let now = Local.with_ymd_and_hms(2026, 3, 9, 15, 4, 0).unwrap();
        assert_eq!(scan_file_name(&now), "scan_20260309_1504.csv");
    }
}
