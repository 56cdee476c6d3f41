//! Signal predicates evaluated bar by bar over an `IndicatorFrame`.
//!
//! A predicate is an AND of atomic conditions. Each condition reads only the
//! bar it is evaluated at and bars before it, so evaluation at index `i`
//! never sees information from after bar `i`'s close.

use indicators::{FrameSpec, IndicatorFrame, KDJ_PERIOD};
use market_io::Bar;
use serde::{Deserialize, Serialize};

/// One atomic test on a single bar. Unavailable inputs make it false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// RSI strictly below `threshold`.
    RsiBelow { period: usize, threshold: f64 },
    /// RSI at or below `threshold`.
    RsiAtMost { period: usize, threshold: f64 },
    /// Close strictly above its moving average.
    CloseAboveMa { period: usize },
    /// Moving average flat or higher than on the previous bar.
    MaRising { period: usize },
    /// Volume strictly above the previous bar's volume.
    VolumeIncrease,
    /// MACD histogram strictly above the previous bar's histogram.
    MacdImproving,
    KdjKAtMost { threshold: f64 },
    /// K crosses above D on this bar.
    KdjGoldenCross,
    VolumeRatioAbove { lookback: usize, threshold: f64 },
    /// Volume ratio inside `[min, max]`.
    VolumeRatioBetween { lookback: usize, min: f64, max: f64 },
    TurnoverAvgAtMost { period: usize, threshold: f64 },
    CloseAtLeast { price: f64 },
    /// Absolute daily percent change at most `max_abs`.
    ChangeWithin { max_abs: f64 },
    /// Percent distance from close up to the moving average, at least `percent`.
    MaDiscountAtLeast { period: usize, percent: f64 },
}

impl Condition {
    pub fn holds(&self, bars: &[Bar], frame: &IndicatorFrame, i: usize) -> bool {
        let Some(bar) = bars.get(i) else {
            return false;
        };
        let prev = i.checked_sub(1);

        match *self {
            Condition::RsiBelow { period, threshold } => {
                frame.rsi(period, i).is_some_and(|v| v < threshold)
            }
            Condition::RsiAtMost { period, threshold } => {
                frame.rsi(period, i).is_some_and(|v| v <= threshold)
            }
            Condition::CloseAboveMa { period } => {
                frame.ma(period, i).is_some_and(|ma| bar.close > ma)
            }
            Condition::MaRising { period } => {
                let before = prev.and_then(|p| frame.ma(period, p));
                match (frame.ma(period, i), before) {
                    (Some(now), Some(before)) => now >= before,
                    _ => false,
                }
            }
            Condition::VolumeIncrease => prev.is_some_and(|p| bar.volume > bars[p].volume),
            Condition::MacdImproving => {
                let before = prev.and_then(|p| frame.macd_hist(p));
                match (frame.macd_hist(i), before) {
                    (Some(now), Some(before)) => now > before,
                    _ => false,
                }
            }
            Condition::KdjKAtMost { threshold } => frame.kdj_k(i).is_some_and(|k| k <= threshold),
            Condition::KdjGoldenCross => {
                let Some(p) = prev else {
                    return false;
                };
                match (frame.kdj_k(i), frame.kdj_d(i), frame.kdj_k(p), frame.kdj_d(p)) {
                    (Some(k), Some(d), Some(k_prev), Some(d_prev)) => k > d && k_prev <= d_prev,
                    _ => false,
                }
            }
            Condition::VolumeRatioAbove { lookback, threshold } => {
                frame.volume_ratio(lookback, i).is_some_and(|r| r > threshold)
            }
            Condition::VolumeRatioBetween { lookback, min, max } => {
                frame.volume_ratio(lookback, i).is_some_and(|r| (min..=max).contains(&r))
            }
            Condition::TurnoverAvgAtMost { period, threshold } => {
                frame.turnover_avg(period, i).is_some_and(|t| t <= threshold)
            }
            Condition::CloseAtLeast { price } => bar.close >= price,
            Condition::ChangeWithin { max_abs } => bar.pct_change.abs() <= max_abs,
            Condition::MaDiscountAtLeast { period, percent } => frame
                .ma(period, i)
                .filter(|_| bar.close > 0.0)
                .is_some_and(|ma| (ma - bar.close) / bar.close * 100.0 >= percent),
        }
    }

    /// First bar index at which this condition can possibly hold.
    pub fn required_history(&self) -> usize {
        match *self {
            Condition::RsiBelow { period, .. } | Condition::RsiAtMost { period, .. } => period,
            Condition::CloseAboveMa { period }
            | Condition::TurnoverAvgAtMost { period, .. }
            | Condition::MaDiscountAtLeast { period, .. } => period.saturating_sub(1),
            Condition::MaRising { period } => period,
            Condition::VolumeIncrease | Condition::MacdImproving => 1,
            Condition::KdjKAtMost { .. } => KDJ_PERIOD - 1,
            Condition::KdjGoldenCross => KDJ_PERIOD,
            Condition::VolumeRatioAbove { lookback, .. }
            | Condition::VolumeRatioBetween { lookback, .. } => {
                lookback
            }
            Condition::CloseAtLeast { .. } | Condition::ChangeWithin { .. } => 0,
        }
    }

    /// Indicator series this condition reads.
    pub fn frame_needs(&self) -> FrameSpec {
        let spec = FrameSpec::default();
        match *self {
            Condition::RsiBelow { period, .. } | Condition::RsiAtMost { period, .. } => {
                spec.with_rsi(period)
            }
            Condition::CloseAboveMa { period }
            | Condition::MaRising { period }
            | Condition::MaDiscountAtLeast { period, .. } => spec.with_ma(period),
            Condition::MacdImproving => spec.with_macd(),
            Condition::KdjKAtMost { .. } | Condition::KdjGoldenCross => spec.with_kdj(),
            Condition::VolumeRatioAbove { lookback, .. }
            | Condition::VolumeRatioBetween { lookback, .. } => {
                spec.with_volume_ratio(lookback)
            }
            Condition::TurnoverAvgAtMost { period, .. } => spec.with_turnover(period),
            Condition::VolumeIncrease
            | Condition::CloseAtLeast { .. }
            | Condition::ChangeWithin { .. } => spec,
        }
    }

    /// Rejects parameters no series can satisfy.
    pub fn validate(&self) -> Result<(), String> {
        let zero_window = match *self {
            Condition::RsiBelow { period, .. }
            | Condition::RsiAtMost { period, .. }
            | Condition::CloseAboveMa { period }
            | Condition::MaRising { period }
            | Condition::TurnoverAvgAtMost { period, .. }
            | Condition::MaDiscountAtLeast { period, .. } => period == 0,
            Condition::VolumeRatioAbove { lookback, .. }
            | Condition::VolumeRatioBetween { lookback, .. } => {
                lookback == 0
            }
            _ => false,
        };
        if zero_window {
            return Err(format!("{self:?}: window length must be positive"));
        }
        if let Condition::VolumeRatioBetween { min, max, .. } = *self {
            if min > max {
                return Err(format!("{self:?}: min exceeds max"));
            }
        }
        Ok(())
    }
}

/// A named conjunction of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub name: String,
    pub conditions: Vec<Condition>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
        }
    }

    /// Oversold ignition: RSI6 < 25, close above MA5, volume up on the day,
    /// MACD histogram improving.
    pub fn ignition() -> Self {
        Self::new(
            "ignition",
            vec![
                Condition::RsiBelow {
                    period: 6,
                    threshold: 25.0,
                },
                Condition::CloseAboveMa { period: 5 },
                Condition::VolumeIncrease,
                Condition::MacdImproving,
            ],
        )
    }

    pub fn holds(&self, bars: &[Bar], frame: &IndicatorFrame, i: usize) -> bool {
        self.conditions.iter().all(|c| c.holds(bars, frame, i))
    }

    pub fn required_history(&self) -> usize {
        self.conditions
            .iter()
            .map(Condition::required_history)
            .max()
            .unwrap_or(0)
    }

    pub fn frame_spec(&self) -> FrameSpec {
        self.conditions.iter().fold(FrameSpec::default(), |mut spec, c| {
            spec.merge(&c.frame_needs());
            spec
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.conditions.is_empty() {
            return Err(format!("predicate '{}' has no conditions", self.name));
        }
        self.conditions.iter().try_for_each(Condition::validate)
    }
}

/// Indices in `[warm_up, n - max_horizon - 1]` where `predicate` holds,
/// in ascending order.
pub fn detect_signals(
    predicate: &Predicate,
    bars: &[Bar],
    frame: &IndicatorFrame,
    warm_up: usize,
    max_horizon: usize,
) -> Vec<usize> {
    let end = bars.len().saturating_sub(max_horizon);
    (warm_up..end)
        .filter(|&i| predicate.holds(bars, frame, i))
        .collect()
}
