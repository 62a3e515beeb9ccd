//! Fixed-interval OHLC candles folded from ticks.
//!
//! Interval boundaries are wall-clock aligned (`timestamp / interval`). A candle
//! closes lazily, on the first tick that lands in a later bucket; there is no
//! timer, so a quiet stream simply leaves the current candle open.

use crate::domain::tick::Tick;
use crate::domain::window::BoundedWindow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Tick count for candles built here; whatever the feed reported for external ones.
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    fn from_tick(open_time: i64, price: f64) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1.0,
        }
    }

    fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += 1.0;
    }
}

#[derive(Debug, Clone)]
pub struct CandleAggregator {
    interval_ms: i64,
    current: Option<Candle>,
    closed: BoundedWindow<Candle>,
}

impl CandleAggregator {
    pub fn new(interval_ms: i64, cap: usize) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            current: None,
            closed: BoundedWindow::new(cap),
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.interval_ms) * self.interval_ms
    }

    /// Folds a tick in. Returns the candle that closed, if this tick crossed a boundary.
    /// Ticks for a bucket that has already closed are dropped when no candle
    /// is open, so a closed bucket is never reopened.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<Candle> {
        let bucket = self.bucket_start(tick.timestamp);
        if self.current.is_none() && self.is_closed_bucket(bucket) {
            return None;
        }
        match self.current.as_mut() {
            Some(candle) if candle.open_time == bucket => {
                candle.update(tick.price);
                None
            }
            Some(candle) if candle.open_time > bucket => {
                // Late tick for an already-closed bucket; fold it into the open candle.
                candle.update(tick.price);
                None
            }
            _ => {
                let finished = self.current.take();
                if let Some(candle) = finished {
                    self.closed.push(candle);
                }
                self.current = Some(Candle::from_tick(bucket, tick.price));
                finished
            }
        }
    }

    fn is_closed_bucket(&self, bucket: i64) -> bool {
        self.closed.last().is_some_and(|last| bucket <= last.open_time)
    }

    /// Accepts a completed candle supplied by the feed. Candles that are not newer
    /// than the last closed one are ignored. The open candle is discarded when the
    /// external one covers its bucket or a later one.
    pub fn on_external_candle(&mut self, candle: Candle) -> Option<Candle> {
        if let Some(last) = self.closed.last() {
            if candle.open_time <= last.open_time {
                return None;
            }
        }
        if let Some(current) = self.current {
            if current.open_time <= candle.open_time {
                self.current = None;
            }
        }
        self.closed.push(candle);
        Some(candle)
    }

    /// Restores previously closed candles, oldest first.
    pub fn seed(&mut self, candles: Vec<Candle>) {
        self.closed.clear();
        for candle in candles {
            self.closed.push(candle);
        }
        self.current = None;
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn closed(&self) -> &BoundedWindow<Candle> {
        &self.closed
    }

    pub fn last_closed(&self) -> Option<&Candle> {
        self.closed.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.closed.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.closed.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.closed.iter().map(|c| c.low).collect()
    }
}
