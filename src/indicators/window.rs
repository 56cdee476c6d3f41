use std::collections::VecDeque;

/// Rolling minimum over `period` bars. The first `period - 1` values are NaN.
pub fn rolling_min(data: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(data, period, |incoming, queued| incoming <= queued)
}

/// Rolling maximum over `period` bars. The first `period - 1` values are NaN.
pub fn rolling_max(data: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(data, period, |incoming, queued| incoming >= queued)
}

/// Monotonic-deque sweep. `dominates(incoming, queued)` says the incoming value
/// makes the queued one irrelevant for every later window.
fn rolling_extreme(data: &[f64], period: usize, dominates: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 {
        return out;
    }

    let mut deque: VecDeque<usize> = VecDeque::with_capacity(period);
    let mut last_gap: Option<usize> = None;

    for (i, &value) in data.iter().enumerate() {
        if let Some(&front) = deque.front() {
            if front + period <= i {
                deque.pop_front();
            }
        }

        if value.is_finite() {
            while let Some(&back) = deque.back() {
                if dominates(value, data[back]) {
                    deque.pop_back();
                } else {
                    break;
                }
            }
            deque.push_back(i);
        } else {
            last_gap = Some(i);
        }

        let window_complete = i + 1 >= period;
        let window_clean = last_gap.is_none_or(|gap| gap + period <= i);
        if window_complete && window_clean {
            if let Some(&front) = deque.front() {
                out[i] = data[front];
            }
        }
    }

    out
}
