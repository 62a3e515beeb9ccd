//! Momentum index: SMA(fast) - SMA(slow) of the median price (high+low)/2.
//!
//! This is the series the divergence detector compares against brick extremes.

use super::{IndicatorResult, require, sma};

fn medians(highs: &[f64], lows: &[f64]) -> Vec<f64> {
    highs
        .iter()
        .zip(lows)
        .map(|(h, l)| (h + l) / 2.0)
        .collect()
}

pub fn momentum_index(
    highs: &[f64],
    lows: &[f64],
    fast_period: usize,
    slow_period: usize,
) -> IndicatorResult<f64> {
    let mid = medians(highs, lows);
    require(mid.len(), fast_period.max(slow_period).max(1))?;
    Ok(sma(&mid, fast_period)? - sma(&mid, slow_period)?)
}

/// Momentum index evaluated at every index; `None` during warm-up.
pub fn momentum_series(
    highs: &[f64],
    lows: &[f64],
    fast_period: usize,
    slow_period: usize,
) -> Vec<Option<f64>> {
    let mid = medians(highs, lows);
    (1..=mid.len())
        .map(|end| {
            let window = &mid[..end];
            match (sma(window, fast_period), sma(window, slow_period)) {
                (Ok(fast), Ok(slow)) => Some(fast - slow),
                _ => None,
            }
        })
        .collect()
}
