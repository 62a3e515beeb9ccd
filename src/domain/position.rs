//! Open positions and closed trades.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "long" => Some(Side::Long),
            "short" => Some(Side::Short),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Reversal,
    MaxHold,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Reversal => "reversal",
            ExitReason::MaxHold => "max_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop_loss" => Some(ExitReason::StopLoss),
            "take_profit" => Some(ExitReason::TakeProfit),
            "reversal" => Some(ExitReason::Reversal),
            "max_hold" => Some(ExitReason::MaxHold),
            _ => None,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An add-on fill recorded against an open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledEntry {
    pub price: f64,
    pub size: f64,
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub strategy_id: String,
    pub side: Side,
    /// Size-weighted average over the initial fill and every scaled entry.
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: i64,
    /// Strategy-specific level captured at entry, e.g. the breakout level.
    pub reference: Option<f64>,
    pub scaled_entries: Vec<ScaledEntry>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_loss == 0.0 {
            return false;
        }
        if self.is_long() {
            price <= self.stop_loss
        } else {
            price >= self.stop_loss
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        if self.is_long() {
            price >= self.take_profit
        } else {
            price <= self.take_profit
        }
    }

    /// Unrealised return in percent of the entry price.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.side.sign() * (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Favourable move from entry in price units; negative when under water.
    pub fn excursion(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price)
    }

    pub fn held_ms(&self, now: i64) -> i64 {
        now - self.opened_at
    }

    pub fn scale_count(&self) -> usize {
        self.scaled_entries.len()
    }

    /// Adds to the position and re-averages the entry price.
    pub fn add_scale(&mut self, price: f64, size: f64, at: i64) {
        let total = self.size + size;
        if total > 0.0 {
            self.entry_price = (self.entry_price * self.size + price * size) / total;
        }
        self.size = total;
        self.scaled_entries.push(ScaledEntry { price, size, at });
    }

    /// Moves the stop toward the market. Returns false if `candidate` would loosen it.
    pub fn tighten_stop(&mut self, candidate: f64) -> bool {
        let tighter = if self.stop_loss == 0.0 {
            true
        } else if self.is_long() {
            candidate > self.stop_loss
        } else {
            candidate < self.stop_loss
        };
        if tighter {
            self.stop_loss = candidate;
        }
        tighter
    }

    pub fn close(&self, exit_price: f64, closed_at: i64, exit_reason: ExitReason) -> Trade {
        Trade {
            strategy_id: self.strategy_id.clone(),
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            size: self.size,
            pnl_pct: self.pnl_pct(exit_price),
            opened_at: self.opened_at,
            closed_at,
            exit_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub strategy_id: String,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl_pct: f64,
    pub opened_at: i64,
    pub closed_at: i64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_loss(&self) -> bool {
        self.pnl_pct < 0.0
    }

    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }

    pub fn duration_ms(&self) -> i64 {
        self.closed_at - self.opened_at
    }
}
