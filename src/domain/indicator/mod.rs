//! Technical indicators over caller-supplied windows.
//!
//! Every function is pure: it looks only at the slice it is given and keeps no
//! state between calls. Insufficient history is reported as [`NotReady`] rather
//! than a zero or neutral value, so callers can tell warm-up apart from a flat
//! reading.
//!
//! Series are oldest-first; the "current" value is the one computed at the last
//! element.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod momentum;
pub mod rsi;
pub mod stddev;
pub mod volatility;

pub use atr::{Atr, atr, atr_from_prices, true_ranges};
pub use bollinger::{Bollinger, bollinger};
pub use ema::{ema, ema_series, sma};
pub use macd::{Macd, macd};
pub use momentum::{momentum_index, momentum_series};
pub use rsi::rsi;
pub use stddev::stddev;
pub use volatility::volatility_bps;

/// Not enough samples to produce a defined value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("indicator not ready: have {have} samples, need {need}")]
pub struct NotReady {
    pub have: usize,
    pub need: usize,
}

pub type IndicatorResult<T> = Result<T, NotReady>;

/// Fails with [`NotReady`] unless `have >= need`.
pub(crate) fn require(have: usize, need: usize) -> IndicatorResult<()> {
    if have < need {
        Err(NotReady { have, need })
    } else {
        Ok(())
    }
}

/// Converts an absolute price distance into basis points of `price`.
pub fn to_bps(value: f64, price: f64) -> f64 {
    if price == 0.0 {
        0.0
    } else {
        value / price * 10_000.0
    }
}
