//! Simple and exponential moving averages.
//!
//! EMA: k = 2/(n+1), seeded with the SMA of the first n values, then
//! EMA[i] = v[i]*k + EMA[i-1]*(1-k).

use super::{IndicatorResult, require};

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> IndicatorResult<f64> {
    let period = period.max(1);
    require(values.len(), period)?;
    let window = &values[values.len() - period..];
    Ok(window.iter().sum::<f64>() / period as f64)
}

/// EMA values from the seed point onward: element 0 corresponds to
/// `values[period - 1]`.
pub fn ema_series(values: &[f64], period: usize) -> IndicatorResult<Vec<f64>> {
    let period = period.max(1);
    require(values.len(), period)?;

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(ema);
    for value in &values[period..] {
        ema = value * k + ema * (1.0 - k);
        out.push(ema);
    }
    Ok(out)
}

/// Current EMA.
pub fn ema(values: &[f64], period: usize) -> IndicatorResult<f64> {
    let series = ema_series(values, period)?;
    Ok(series[series.len() - 1])
}
