//! Persistence store port.
//!
//! Every record is keyed by strategy id. Each strategy owns four namespaces:
//! the single open position, and the bounded brick, candle and price-history
//! windows. Closed trades form an append-only log beside them.
//!
//! Implementations must make each call atomic: a crash mid-write leaves the
//! previous state readable. Loads return records oldest first.

use crate::domain::brick::Brick;
use crate::domain::candle::Candle;
use crate::domain::error::TickwiseError;
use crate::domain::position::{Position, Trade};
use crate::domain::settings::RetentionCaps;
use crate::domain::tick::Tick;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Position,
    Bricks,
    Candles,
    PriceHistory,
    Trades,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Namespace::Position => "position",
            Namespace::Bricks => "bricks",
            Namespace::Candles => "candles",
            Namespace::PriceHistory => "price_history",
            Namespace::Trades => "trades",
        };
        f.write_str(name)
    }
}

/// Rows removed by one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub prices: usize,
    pub candles: usize,
    pub bricks: usize,
}

impl CompactionReport {
    pub fn total(&self) -> usize {
        self.prices + self.candles + self.bricks
    }
}

pub trait StorePort: Send + Sync {
    /// Inserts or replaces the strategy's position.
    fn save_position(&self, position: &Position) -> Result<(), TickwiseError>;
    fn load_position(&self, strategy: &str) -> Result<Option<Position>, TickwiseError>;
    fn clear_position(&self, strategy: &str) -> Result<(), TickwiseError>;
    /// Appends the trade and removes the position in one transaction.
    fn close_position(&self, trade: &Trade) -> Result<(), TickwiseError>;

    fn append_bricks(&self, strategy: &str, bricks: &[Brick]) -> Result<(), TickwiseError>;
    /// The newest `limit` bricks.
    fn load_bricks(&self, strategy: &str, limit: usize) -> Result<Vec<Brick>, TickwiseError>;

    fn append_candle(&self, strategy: &str, candle: &Candle) -> Result<(), TickwiseError>;
    fn load_candles(&self, strategy: &str, limit: usize) -> Result<Vec<Candle>, TickwiseError>;

    fn append_price(&self, strategy: &str, tick: &Tick) -> Result<(), TickwiseError>;
    fn load_prices(&self, strategy: &str, limit: usize) -> Result<Vec<Tick>, TickwiseError>;

    fn load_trades(&self, strategy: &str, limit: usize) -> Result<Vec<Trade>, TickwiseError>;

    fn count(&self, strategy: &str, namespace: Namespace) -> Result<usize, TickwiseError>;

    /// Trims the bounded namespaces to their caps. Trades are never trimmed.
    fn compact(
        &self,
        strategy: &str,
        caps: &RetentionCaps,
    ) -> Result<CompactionReport, TickwiseError>;
}
