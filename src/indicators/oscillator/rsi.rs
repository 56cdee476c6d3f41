/// Below this average loss the window counts as loss-free and RSI saturates.
const LOSS_EPSILON: f64 = 1e-10;

/// Compute RSI (Relative Strength Index) with simple rolling means.
///
/// - gain_t = max(close_t - close_{t-1}, 0), loss_t = max(close_{t-1} - close_t, 0)
/// - average gain/loss = mean of the last `period` gains/losses
/// - RSI = 100 - 100 / (1 + avg_gain / avg_loss)
///
/// A window without losses yields 100, never a division fault. The first
/// defined index is `period`; windows touching a non-finite close are NaN.
///
/// # Returns
/// Vector aligned with `closes`, values in [0, 100] or NaN.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n <= period {
        return out;
    }

    // Change at index t (t >= 1); None when either close is non-finite.
    let change = |t: usize| {
        let (prev, curr) = (closes[t - 1], closes[t]);
        (prev.is_finite() && curr.is_finite()).then(|| curr - prev)
    };

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    let mut gaps = 0usize;

    for t in 1..n {
        match change(t) {
            Some(delta) if delta > 0.0 => gain_sum += delta,
            Some(delta) => loss_sum -= delta,
            None => gaps += 1,
        }

        if t > period {
            match change(t - period) {
                Some(delta) if delta > 0.0 => gain_sum -= delta,
                Some(delta) => loss_sum += delta,
                None => gaps -= 1,
            }
            // Running sums drift below zero by rounding on long flat stretches.
            gain_sum = gain_sum.max(0.0);
            loss_sum = loss_sum.max(0.0);
        }

        if t >= period && gaps == 0 {
            let avg_gain = gain_sum / period as f64;
            let avg_loss = loss_sum / period as f64;
            let value = if avg_loss < LOSS_EPSILON {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
            };
            out[t] = value.clamp(0.0, 100.0);
        }
    }

    out
}
