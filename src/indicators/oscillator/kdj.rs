use crate::trend::ma::smooth;
use crate::window::{rolling_max, rolling_min};

/// K and D start from the neutral midpoint before the first RSV arrives.
const KDJ_SEED: f64 = 50.0;
const RANGE_EPSILON: f64 = 1e-10;

/// KDJ stochastic oscillator output.
#[derive(Debug, Clone)]
pub struct KdjOutput {
    pub rsv: Vec<f64>,
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

/// Computes KDJ.
///
/// RSV_t = (close_t - lowest low) / (highest high - lowest low) * 100 over
/// `period` bars, 50 when the range is flat. K smooths RSV with factor
/// `1 / k_smooth`, D smooths K with `1 / d_smooth`, both seeded at 50.
pub fn kdj(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> KdjOutput {
    let n = closes.len().min(highs.len()).min(lows.len());
    let highest = rolling_max(&highs[..n], period);
    let lowest = rolling_min(&lows[..n], period);

    let rsv: Vec<f64> = (0..n)
        .map(|i| {
            let (hi, lo, close) = (highest[i], lowest[i], closes[i]);
            if !(hi.is_finite() && lo.is_finite() && close.is_finite()) {
                return f64::NAN;
            }
            let range = hi - lo;
            if range < RANGE_EPSILON {
                50.0
            } else {
                (close - lo) / range * 100.0
            }
        })
        .collect();

    let k = smooth(&rsv, smoothing_factor(k_smooth), Some(KDJ_SEED));
    let d = smooth(&k, smoothing_factor(d_smooth), Some(KDJ_SEED));

    KdjOutput { rsv, k, d }
}

fn smoothing_factor(span: usize) -> f64 {
    1.0 / span.max(1) as f64
}
