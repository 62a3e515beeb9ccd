//! Raw market input: price ticks and externally supplied candles.

use crate::domain::candle::Candle;
use crate::domain::error::TickwiseError;
use serde::{Deserialize, Serialize};

/// A single trade print. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    pub price: f64,
}

impl Tick {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// Rejects non-finite or non-positive prices and timestamps that move backwards.
    /// Equal timestamps are allowed.
    pub fn validate(&self, last_timestamp: Option<i64>) -> Result<(), TickwiseError> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(TickwiseError::MalformedTick {
                reason: format!("price {} is not a positive number", self.price),
            });
        }
        match last_timestamp {
            Some(last) if self.timestamp < last => Err(TickwiseError::MalformedTick {
                reason: format!(
                    "timestamp {} is earlier than last seen {}",
                    self.timestamp, last
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// One item on the shared feed.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Tick(Tick),
    Candle(Candle),
}

impl MarketEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Tick(tick) => tick.timestamp,
            MarketEvent::Candle(candle) => candle.open_time,
        }
    }
}
