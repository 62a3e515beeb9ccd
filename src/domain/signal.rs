//! Transient signals produced by one evaluation cycle.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    EntryLong,
    EntryShort,
    Exit,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::EntryLong => write!(f, "entry_long"),
            SignalKind::EntryShort => write!(f, "entry_short"),
            SignalKind::Exit => write!(f, "exit"),
        }
    }
}

/// Indicator readings behind a signal. Fields a strategy does not use stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub rsi: Option<f64>,
    pub bb_position: Option<f64>,
    pub atr_bps: Option<f64>,
    pub volatility_bps: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub momentum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    /// In [0,1].
    pub strength: f64,
    pub reason: String,
    pub snapshot: IndicatorSnapshot,
}

impl Signal {
    pub fn new(kind: SignalKind, strength: f64, reason: impl Into<String>, snapshot: IndicatorSnapshot) -> Self {
        Self {
            kind,
            strength: strength.clamp(0.0, 1.0),
            reason: reason.into(),
            snapshot,
        }
    }
}
