use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::NullPolicy;
use crate::models::{ForwardReturn, SignalEvent, StatisticsRow};

/// Mergeable running totals for one horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HorizonAccumulator {
    pub sample_count: usize,
    pub wins: usize,
    pub return_sum: f64,
    pub clamped: usize,
}

impl HorizonAccumulator {
    pub fn observe(&mut self, value: ForwardReturn, policy: NullPolicy) {
        let counted = match (value, policy) {
            (ForwardReturn::Value(v), _) => Some(v),
            (ForwardReturn::Clamped, NullPolicy::ZeroFill) => Some(ForwardReturn::SENTINEL),
            (ForwardReturn::Clamped, NullPolicy::DropNull) => None,
        };
        if value.is_clamped() {
            self.clamped += 1;
        }
        if let Some(v) = counted {
            self.sample_count += 1;
            self.return_sum += v;
            if v > 0.0 {
                self.wins += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &HorizonAccumulator) {
        self.sample_count += other.sample_count;
        self.wins += other.wins;
        self.return_sum += other.return_sum;
        self.clamped += other.clamped;
    }

    pub fn to_row(&self, horizon: usize) -> StatisticsRow {
        let (win_rate, average_return) = if self.sample_count == 0 {
            (None, None)
        } else {
            let n = self.sample_count as f64;
            (Some(self.wins as f64 / n), Some(self.return_sum / n))
        };
        StatisticsRow {
            horizon,
            win_rate,
            average_return,
            sample_count: self.sample_count,
            clamped_count: self.clamped,
        }
    }
}

/// Per-horizon summary for one run, tagged with the policy that built it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub policy: NullPolicy,
    pub signal_count: usize,
    pub rows: Vec<StatisticsRow>,
}

/// Canonical event order: instrument id, then signal index. Entry price and
/// returns break ties so duplicate keys still sort deterministically.
pub fn canonical_order(a: &SignalEvent, b: &SignalEvent) -> Ordering {
    a.instrument_id
        .cmp(&b.instrument_id)
        .then(a.signal_index.cmp(&b.signal_index))
        .then(a.entry_price.total_cmp(&b.entry_price))
        .then_with(|| {
            let values = |e: &SignalEvent| e.returns.values().map(|r| r.value()).collect::<Vec<_>>();
            let (va, vb) = (values(a), values(b));
            va.iter()
                .zip(&vb)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| va.len().cmp(&vb.len()))
        })
}

/// Folds `events` into one accumulator per horizon.
///
/// Events are put in canonical order first, so any permutation of the
/// input gives bit-identical sums.
pub fn accumulate(
    events: &[SignalEvent],
    horizons: &[usize],
    policy: NullPolicy,
) -> FxHashMap<usize, HorizonAccumulator> {
    let mut ordered: Vec<&SignalEvent> = events.iter().collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    let mut totals: FxHashMap<usize, HorizonAccumulator> =
        horizons.iter().map(|&h| (h, HorizonAccumulator::default())).collect();
    for event in ordered {
        for (h, acc) in totals.iter_mut() {
            if let Some(&value) = event.returns.get(h) {
                acc.observe(value, policy);
            }
        }
    }
    totals
}

/// Summary table over all events, rows by ascending horizon.
pub fn summarize(events: &[SignalEvent], horizons: &[usize], policy: NullPolicy) -> SummaryTable {
    let totals = accumulate(events, horizons, policy);
    let mut ordered_horizons = horizons.to_vec();
    ordered_horizons.sort_unstable();
    ordered_horizons.dedup();

    let rows = ordered_horizons
        .into_iter()
        .map(|h| totals.get(&h).copied().unwrap_or_default().to_row(h))
        .collect();

    SummaryTable {
        policy,
        signal_count: events.len(),
        rows,
    }
}
