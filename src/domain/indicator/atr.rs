//! Average True Range with Wilder's smoothing.
//!
//! TR = max(high - low, |high - prev_close|, |low - prev_close|). The first ATR
//! is the mean of the first n true ranges, then
//! ATR = (prev * (n-1) + TR) / n. Needs n+1 samples.

use super::{IndicatorResult, require, to_bps};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atr {
    pub value: f64,
    /// `value` in basis points of the last close.
    pub bps: f64,
}

/// True ranges for indices 1..n. Slices must be the same length.
pub fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let len = highs.len().min(lows.len()).min(closes.len());
    (1..len)
        .map(|i| {
            let prev_close = closes[i - 1];
            let hl = highs[i] - lows[i];
            let hc = (highs[i] - prev_close).abs();
            let lc = (lows[i] - prev_close).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> IndicatorResult<Atr> {
    let period = period.max(1);
    let len = highs.len().min(lows.len()).min(closes.len());
    require(len, period + 1)?;

    let ranges = true_ranges(highs, lows, closes);
    let mut value = ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &ranges[period..] {
        value = (value * (period - 1) as f64 + tr) / period as f64;
    }

    Ok(Atr {
        value,
        bps: to_bps(value, closes[len - 1]),
    })
}

/// ATR over a raw price series, where each price is its own high, low and close.
pub fn atr_from_prices(prices: &[f64], period: usize) -> IndicatorResult<Atr> {
    atr(prices, prices, prices, period)
}
