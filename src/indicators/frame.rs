use std::collections::BTreeSet;

use market_io::Bar;
use rustc_hash::FxHashMap;

use crate::oscillator::kdj::{kdj, KdjOutput};
use crate::oscillator::rsi::rsi;
use crate::trend::ma::moving_average;
use crate::trend::macd::macd;
use crate::volume::ratio::volume_ratio;

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const KDJ_PERIOD: usize = 9;
const KDJ_SMOOTH: usize = 3;

/// Which indicator series an `IndicatorFrame` should hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSpec {
    pub ma_periods: BTreeSet<usize>,
    pub rsi_periods: BTreeSet<usize>,
    pub volume_ratio_lookbacks: BTreeSet<usize>,
    pub turnover_periods: BTreeSet<usize>,
    pub macd: bool,
    pub kdj: bool,
}

impl FrameSpec {
    pub fn merge(&mut self, other: &FrameSpec) {
        self.ma_periods.extend(&other.ma_periods);
        self.rsi_periods.extend(&other.rsi_periods);
        self.volume_ratio_lookbacks.extend(&other.volume_ratio_lookbacks);
        self.turnover_periods.extend(&other.turnover_periods);
        self.macd |= other.macd;
        self.kdj |= other.kdj;
    }

    pub fn with_ma(mut self, period: usize) -> Self {
        self.ma_periods.insert(period);
        self
    }

    pub fn with_rsi(mut self, period: usize) -> Self {
        self.rsi_periods.insert(period);
        self
    }

    pub fn with_volume_ratio(mut self, lookback: usize) -> Self {
        self.volume_ratio_lookbacks.insert(lookback);
        self
    }

    pub fn with_turnover(mut self, period: usize) -> Self {
        self.turnover_periods.insert(period);
        self
    }

    pub fn with_macd(mut self) -> Self {
        self.macd = true;
        self
    }

    pub fn with_kdj(mut self) -> Self {
        self.kdj = true;
        self
    }
}

/// Indicator series for one instrument, aligned index-for-index with its bars.
///
/// Accessors return `None` both for series that were never requested and for
/// slots that are not available (warm-up or non-finite input).
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    len: usize,
    ma: FxHashMap<usize, Vec<f64>>,
    rsi: FxHashMap<usize, Vec<f64>>,
    volume_ratio: FxHashMap<usize, Vec<f64>>,
    turnover_avg: FxHashMap<usize, Vec<f64>>,
    macd_hist: Option<Vec<f64>>,
    kdj: Option<KdjOutput>,
}

impl IndicatorFrame {
    pub fn compute(bars: &[Bar], spec: &FrameSpec) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut frame = Self {
            len: bars.len(),
            ..Self::default()
        };

        for &period in &spec.ma_periods {
            frame.ma.insert(period, moving_average(&closes, period));
        }
        for &period in &spec.rsi_periods {
            frame.rsi.insert(period, rsi(&closes, period));
        }
        if !spec.volume_ratio_lookbacks.is_empty() {
            let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
            for &lookback in &spec.volume_ratio_lookbacks {
                frame.volume_ratio.insert(lookback, volume_ratio(&volumes, lookback));
            }
        }
        if !spec.turnover_periods.is_empty() {
            let turnover: Vec<f64> = bars.iter().map(|b| b.turnover).collect();
            for &period in &spec.turnover_periods {
                frame.turnover_avg.insert(period, moving_average(&turnover, period));
            }
        }
        if spec.macd {
            frame.macd_hist = Some(macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL).histogram);
        }
        if spec.kdj {
            let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
            let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
            frame.kdj = Some(kdj(&highs, &lows, &closes, KDJ_PERIOD, KDJ_SMOOTH, KDJ_SMOOTH));
        }

        frame
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ma(&self, period: usize, index: usize) -> Option<f64> {
        lookup(self.ma.get(&period), index)
    }

    pub fn rsi(&self, period: usize, index: usize) -> Option<f64> {
        lookup(self.rsi.get(&period), index)
    }

    pub fn volume_ratio(&self, lookback: usize, index: usize) -> Option<f64> {
        lookup(self.volume_ratio.get(&lookback), index)
    }

    pub fn turnover_avg(&self, period: usize, index: usize) -> Option<f64> {
        lookup(self.turnover_avg.get(&period), index)
    }

    pub fn macd_hist(&self, index: usize) -> Option<f64> {
        lookup(self.macd_hist.as_ref(), index)
    }

    pub fn kdj_k(&self, index: usize) -> Option<f64> {
        lookup(self.kdj.as_ref().map(|out| &out.k), index)
    }

    pub fn kdj_d(&self, index: usize) -> Option<f64> {
        lookup(self.kdj.as_ref().map(|out| &out.d), index)
    }
}

fn lookup(series: Option<&Vec<f64>>, index: usize) -> Option<f64> {
    series
        .and_then(|values| values.get(index))
        .copied()
        .filter(|v| crate::is_available(*v))
}
