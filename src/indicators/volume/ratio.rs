/// Ratio of each bar's volume to the mean volume of the `lookback` bars
/// before it (the current bar is excluded from the mean).
///
/// NaN for index < `lookback`, when the trailing window holds a non-finite
/// volume, or when the trailing mean is not positive.
pub fn volume_ratio(volumes: &[f64], lookback: usize) -> Vec<f64> {
    let n = volumes.len();
    let mut out = vec![f64::NAN; n];
    if lookback == 0 {
        return out;
    }

    let mut sum = 0.0;
    let mut gaps = 0usize;

    for i in 0..n {
        if i >= lookback {
            let current = volumes[i];
            let mean = sum / lookback as f64;
            if gaps == 0 && mean > 0.0 && current.is_finite() {
                out[i] = current / mean;
            }
        }

        // Slide the trailing window forward to cover [i + 1 - lookback, i].
        let entering = volumes[i];
        if entering.is_finite() {
            sum += entering;
        } else {
            gaps += 1;
        }
        if i >= lookback {
            let leaving = volumes[i - lookback];
            if leaving.is_finite() {
                sum -= leaving;
            } else {
                gaps -= 1;
            }
        }
    }

    out
}
