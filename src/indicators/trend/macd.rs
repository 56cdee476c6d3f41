use crate::trend::ma::exponential_moving_average;

/// MACD (Moving Average Convergence Divergence) output.
#[derive(Debug, Clone)]
pub struct MacdOutput {
    /// DIF = fast EMA - slow EMA
    pub dif: Vec<f64>,
    /// DEA = EMA of DIF
    pub dea: Vec<f64>,
    /// Histogram = (DIF - DEA) * 2
    pub histogram: Vec<f64>,
}

/// Computes MACD over closing prices.
///
/// Both EMAs are seeded with the first finite close, so every series is
/// defined from index 0 (subject to non-finite inputs).
///
/// # Arguments
///
/// * `closes` - Closing prices.
/// * `fast_span` - Span of the fast EMA (typically 12).
/// * `slow_span` - Span of the slow EMA (typically 26).
/// * `signal_span` - Span of the DEA EMA (typically 9).
pub fn macd(closes: &[f64], fast_span: usize, slow_span: usize, signal_span: usize) -> MacdOutput {
    let fast = exponential_moving_average(closes, fast_span);
    let slow = exponential_moving_average(closes, slow_span);

    let dif: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let dea = exponential_moving_average(&dif, signal_span);
    let histogram = dif.iter().zip(&dea).map(|(d, e)| (d - e) * 2.0).collect();

    MacdOutput { dif, dea, histogram }
}
