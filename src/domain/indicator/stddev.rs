//! Population standard deviation over the last n values (divides by N, not N-1).

use super::{IndicatorResult, require, sma};

pub fn stddev(values: &[f64], period: usize) -> IndicatorResult<f64> {
    let period = period.max(1);
    require(values.len(), period)?;
    let mean = sma(values, period)?;
    let window = &values[values.len() - period..];
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / period as f64;
    Ok(variance.sqrt())
}
