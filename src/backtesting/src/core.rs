use std::collections::BTreeMap;

use indicators::IndicatorFrame;
use market_io::{Bar, InstrumentSeries};

use crate::config::BacktestConfig;
use crate::models::{ForwardReturn, RunOutcome, SignalEvent, SkipReason};
use crate::signals::detect_signals;

/// Forward returns for a position opened at `entry_price` after signal bar
/// `signal_index`.
///
/// For each horizon h, return% = (close[i + h] - entry) / entry * 100,
/// rounded to `decimals`. A missing or non-finite exit yields `Clamped`.
pub fn forward_returns(
    bars: &[Bar],
    signal_index: usize,
    entry_price: f64,
    horizons: &[usize],
    decimals: u32,
) -> BTreeMap<usize, ForwardReturn> {
    horizons
        .iter()
        .map(|&h| {
            let raw = bars
                .get(signal_index + h)
                .map_or(f64::NAN, |exit| (exit.close - entry_price) / entry_price * 100.0);
            (h, ForwardReturn::from_raw(raw, decimals))
        })
        .collect()
}

/// Builds the event for a signal at `signal_index`, buying at the next
/// bar's open.
///
/// # Returns
/// `None` when there is no next bar or the entry price is not a positive
/// finite number; such signals are discarded.
pub fn evaluate_signal(
    instrument_id: &str,
    bars: &[Bar],
    signal_index: usize,
    config: &BacktestConfig,
) -> Option<SignalEvent> {
    let signal_bar = bars.get(signal_index)?;
    let entry_price = bars.get(signal_index + 1)?.open;
    if !(entry_price > 0.0 && entry_price.is_finite()) {
        return None;
    }

    Some(SignalEvent {
        instrument_id: instrument_id.to_string(),
        signal_date: signal_bar.date,
        signal_index,
        entry_price,
        returns: forward_returns(
            bars,
            signal_index,
            entry_price,
            &config.horizons,
            config.return_decimals,
        ),
    })
}

/// Full walk-forward run over one instrument's history.
///
/// Pure: the same series and config always give the same outcome. Short
/// series are skipped; bad values inside the series only suppress the
/// signals they touch.
pub fn run_instrument(series: &InstrumentSeries, config: &BacktestConfig) -> RunOutcome {
    if series.len() < config.min_bars {
        return RunOutcome::Skipped(SkipReason::TooShort {
            len: series.len(),
            min: config.min_bars,
        });
    }

    let bars = series.bars();
    let frame = IndicatorFrame::compute(bars, &config.predicate.frame_spec());
    let hits = detect_signals(
        &config.predicate,
        bars,
        &frame,
        config.effective_warm_up(),
        config.max_horizon(),
    );

    let events = hits
        .into_iter()
        .filter_map(|i| evaluate_signal(series.id(), bars, i, config))
        .collect();
    RunOutcome::Completed(events)
}
