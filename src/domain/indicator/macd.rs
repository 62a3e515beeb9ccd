//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Warmup: slow - 1 + signal closes, i.e. the signal EMA needs `signal` MACD
//! points and the first MACD point sits at index slow - 1.

use super::{IndicatorResult, ema, ema_series, require};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> IndicatorResult<Macd> {
    let fast = fast.max(1);
    let slow = slow.max(fast);
    let signal = signal.max(1);
    require(closes.len(), slow - 1 + signal)?;

    let fast_series = ema_series(closes, fast)?;
    let slow_series = ema_series(closes, slow)?;

    // Align both series on the slow EMA's first point.
    let offset = slow - fast;
    let line: Vec<f64> = slow_series
        .iter()
        .zip(&fast_series[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let signal_value = ema(&line, signal)?;
    let line_value = line[line.len() - 1];
    Ok(Macd {
        line: line_value,
        signal: signal_value,
        histogram: line_value - signal_value,
    })
}
