use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// Forward return of one signal at one horizon, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardReturn {
    Value(f64),
    /// The computed return was non-finite and was replaced by `SENTINEL`.
    Clamped,
}

impl ForwardReturn {
    /// Read-back value of a clamped return.
    pub const SENTINEL: f64 = 0.0;

    /// Rounds a raw percent return to `decimals` places, clamping non-finite
    /// values.
    pub fn from_raw(raw: f64, decimals: u32) -> Self {
        if !raw.is_finite() {
            return ForwardReturn::Clamped;
        }
        let scale = 10f64.powi(decimals as i32);
        let rounded = (raw * scale).round() / scale;
        if rounded.is_finite() {
            ForwardReturn::Value(rounded)
        } else {
            ForwardReturn::Clamped
        }
    }

    pub fn value(self) -> f64 {
        match self {
            ForwardReturn::Value(v) => v,
            ForwardReturn::Clamped => Self::SENTINEL,
        }
    }

    pub fn is_clamped(self) -> bool {
        matches!(self, ForwardReturn::Clamped)
    }

    /// The return if it was computed, `None` if clamped.
    pub fn as_valid(self) -> Option<f64> {
        match self {
            ForwardReturn::Value(v) => Some(v),
            ForwardReturn::Clamped => None,
        }
    }
}

/// One predicate hit with its forward returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub instrument_id: String,
    pub signal_date: NaiveDate,
    /// Bar index of the signal within its series.
    pub signal_index: usize,
    /// Open of the bar after the signal.
    pub entry_price: f64,
    /// Horizon in bars to forward return.
    pub returns: BTreeMap<usize, ForwardReturn>,
}

impl SignalEvent {
    pub fn clamped_horizons(&self) -> Vec<usize> {
        self.returns
            .iter()
            .filter(|(_, r)| r.is_clamped())
            .map(|(&h, _)| h)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    TooShort { len: usize, min: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooShort { len, min } => write!(f, "{len} bars, need at least {min}"),
        }
    }
}

/// What happened to one instrument.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Vec<SignalEvent>),
    Skipped(SkipReason),
    Failed(BacktestError),
}

impl RunOutcome {
    /// Signals contributed to the aggregate; empty unless completed.
    pub fn signals(&self) -> &[SignalEvent] {
        match self {
            RunOutcome::Completed(events) => events,
            RunOutcome::Skipped(_) | RunOutcome::Failed(_) => &[],
        }
    }

    pub fn into_signals(self) -> Vec<SignalEvent> {
        match self {
            RunOutcome::Completed(events) => events,
            RunOutcome::Skipped(_) | RunOutcome::Failed(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct InstrumentOutcome {
    pub instrument_id: String,
    pub outcome: RunOutcome,
}

/// Per-horizon statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub horizon: usize,
    /// Fraction of counted returns above zero; `None` without samples.
    pub win_rate: Option<f64>,
    pub average_return: Option<f64>,
    pub sample_count: usize,
    pub clamped_count: usize,
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub signals: usize,
}

impl BatchTally {
    pub fn from_outcomes(outcomes: &[InstrumentOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut tally, item| {
            match &item.outcome {
                RunOutcome::Completed(events) => {
                    tally.completed += 1;
                    tally.signals += events.len();
                }
                RunOutcome::Skipped(_) => tally.skipped += 1,
                RunOutcome::Failed(_) => tally.failed += 1,
            }
            tally
        })
    }

    pub fn instruments(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}
