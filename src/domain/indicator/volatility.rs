//! Realised volatility as the mean absolute return, in basis points.

use super::{IndicatorResult, require};

/// Mean of |p[i]/p[i-1] - 1| over the last `period` returns, times 10 000.
pub fn volatility_bps(prices: &[f64], period: usize) -> IndicatorResult<f64> {
    let period = period.max(1);
    require(prices.len(), period + 1)?;
    let window = &prices[prices.len() - period - 1..];
    let total: f64 = window
        .windows(2)
        .map(|pair| {
            if pair[0] == 0.0 {
                0.0
            } else {
                (pair[1] / pair[0] - 1.0).abs()
            }
        })
        .sum();
    Ok(total / period as f64 * 10_000.0)
}
