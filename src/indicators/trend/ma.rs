/// Simple moving average kept as a running sum.
///
/// # Arguments
///
/// * `data` - A slice of f64 values.
/// * `period` - The window size.
///
/// # Returns
///
/// A Vec<f64> aligned with `data`. The first `period - 1` values are NaN, as
/// is every window containing a non-finite input.
pub fn moving_average(data: &[f64], period: usize) -> Vec<f64> {
    let mut sma = vec![f64::NAN; data.len()];
    if period == 0 {
        return sma;
    }

    let mut sum = 0.0;
    let mut gaps = 0usize;

    for (i, &value) in data.iter().enumerate() {
        if value.is_finite() {
            sum += value;
        } else {
            gaps += 1;
        }

        if i >= period {
            let leaving = data[i - period];
            if leaving.is_finite() {
                sum -= leaving;
            } else {
                gaps -= 1;
            }
        }

        if i + 1 >= period && gaps == 0 {
            sma[i] = sum / period as f64;
        }
    }

    sma
}

/// Exponential moving average: `EMA_t = x_t * k + EMA_{t-1} * (1 - k)`,
/// `k = 2 / (span + 1)`, seeded with the first finite value.
///
/// Non-finite inputs produce NaN at their own index and leave the recurrence
/// state untouched.
pub fn exponential_moving_average(data: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return vec![f64::NAN; data.len()];
    }
    let k = 2.0 / (span as f64 + 1.0);
    smooth(data, k, None)
}

/// Exponential recurrence with smoothing factor `alpha`.
///
/// With `seed = None` the first finite input seeds the state; otherwise the
/// first update already blends against `seed`.
pub fn smooth(data: &[f64], alpha: f64, seed: Option<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(data.len());
    let mut state = seed;

    for &value in data {
        if !value.is_finite() {
            out.push(f64::NAN);
            continue;
        }
        let next = match state {
            Some(prev) => value * alpha + prev * (1.0 - alpha),
            None => value,
        };
        state = Some(next);
        out.push(next);
    }

    out
}
