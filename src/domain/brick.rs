//! Renko-style brick construction.
//!
//! A brick closes whenever price has travelled at least one brick size away
//! from the last brick's close. Bricks are contiguous: each one opens at the
//! previous close and covers exactly one brick size, so a fast move emits
//! several bricks from a single tick and any remainder carries over.
//!
//! Brick size comes from [`next_brick_size`], recomputed after every brick.

use crate::domain::tick::Tick;
use crate::domain::window::BoundedWindow;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brick {
    pub open_time: i64,
    pub open: f64,
    pub close: f64,
    pub direction: Direction,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrickConfig {
    pub atr_multiplier: f64,
    /// Fraction of price used as the brick size while ATR is undefined.
    pub fallback_fraction: f64,
    pub max_bricks_per_tick: usize,
    pub cap: usize,
}

impl Default for BrickConfig {
    fn default() -> Self {
        Self {
            atr_multiplier: 0.5,
            fallback_fraction: 0.001,
            max_bricks_per_tick: 50,
            cap: 200,
        }
    }
}

/// Brick size from the current ATR reading, or a fraction of `price` when ATR
/// is undefined or degenerate.
pub fn next_brick_size(atr: Option<f64>, price: f64, config: &BrickConfig) -> f64 {
    match atr {
        Some(value) if value.is_finite() && value > 0.0 => value * config.atr_multiplier,
        _ => price.abs() * config.fallback_fraction,
    }
}

#[derive(Debug, Clone)]
pub struct BrickEngine {
    config: BrickConfig,
    bricks: BoundedWindow<Brick>,
    /// Close of the last brick, or the seed price before the first one.
    anchor: Option<f64>,
    size: Option<f64>,
    formation_start: i64,
    formation_high: f64,
    formation_low: f64,
}

impl BrickEngine {
    pub fn new(config: BrickConfig) -> Self {
        let bricks = BoundedWindow::new(config.cap);
        Self {
            config,
            bricks,
            anchor: None,
            size: None,
            formation_start: 0,
            formation_high: f64::MIN,
            formation_low: f64::MAX,
        }
    }

    /// Restores bricks loaded from storage. The next brick continues from the
    /// last restored close.
    pub fn seed(&mut self, bricks: Vec<Brick>) {
        self.bricks.clear();
        for brick in bricks {
            self.bricks.push(brick);
        }
        self.anchor = self.bricks.last().map(|b| b.close);
        self.size = None;
        self.formation_high = f64::MIN;
        self.formation_low = f64::MAX;
    }

    /// Folds a tick in and returns the bricks it completed, oldest first.
    pub fn on_tick(&mut self, tick: &Tick, atr: Option<f64>) -> Vec<Brick> {
        let price = tick.price;
        let Some(mut anchor) = self.anchor else {
            self.anchor = Some(price);
            self.size = Some(next_brick_size(atr, price, &self.config));
            self.start_formation(tick);
            return Vec::new();
        };

        if self.formation_high < self.formation_low {
            self.start_formation(tick);
        }
        self.formation_high = self.formation_high.max(price);
        self.formation_low = self.formation_low.min(price);

        let mut size = match self.size {
            Some(size) => size,
            None => next_brick_size(atr, anchor, &self.config),
        };

        let mut emitted = Vec::new();
        while size > 0.0 && (price - anchor).abs() >= size {
            if emitted.len() >= self.config.max_bricks_per_tick {
                warn!(
                    price,
                    anchor,
                    brick_size = size,
                    limit = self.config.max_bricks_per_tick,
                    "brick emission truncated for this tick"
                );
                break;
            }

            let direction = if price > anchor {
                Direction::Up
            } else {
                Direction::Down
            };
            let close = match direction {
                Direction::Up => anchor + size,
                Direction::Down => anchor - size,
            };
            let mut brick = Brick {
                open_time: tick.timestamp,
                open: anchor,
                close,
                direction,
                high: anchor.max(close),
                low: anchor.min(close),
            };
            if emitted.is_empty() {
                brick.open_time = self.formation_start;
                brick.high = brick.high.max(self.formation_high);
                brick.low = brick.low.min(self.formation_low);
            }

            self.bricks.push(brick);
            emitted.push(brick);
            anchor = close;
            size = next_brick_size(atr, close, &self.config);
        }

        self.anchor = Some(anchor);
        self.size = Some(size);
        if !emitted.is_empty() {
            self.start_formation(tick);
        }
        emitted
    }

    fn start_formation(&mut self, tick: &Tick) {
        self.formation_start = tick.timestamp;
        self.formation_high = tick.price;
        self.formation_low = tick.price;
    }

    pub fn bricks(&self) -> &BoundedWindow<Brick> {
        &self.bricks
    }

    pub fn brick_size(&self) -> Option<f64> {
        self.size
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }
}
