//! JSON-lines price stream.
//!
//! One object per line, either a tick or a completed candle:
//!
//! ```text
//! {"timestamp": 1700000000000, "price": 43012.5}
//! {"candle": {"open_time": 1699999100000, "open": 43000.0, "high": 43050.0, "low": 42990.0, "close": 43012.5, "volume": 12.0}}
//! ```
//!
//! Blank lines are skipped. Lines that do not parse are logged and dropped;
//! the stream carries on.

use crate::domain::candle::Candle;
use crate::domain::error::TickwiseError;
use crate::domain::tick::{MarketEvent, Tick};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedLine {
    Candle { candle: Candle },
    Tick { timestamp: i64, price: f64 },
}

pub fn parse_line(line: &str) -> Result<MarketEvent, TickwiseError> {
    let parsed: FeedLine =
        serde_json::from_str(line).map_err(|e| TickwiseError::MalformedTick {
            reason: e.to_string(),
        })?;
    Ok(match parsed {
        FeedLine::Candle { candle } => MarketEvent::Candle(candle),
        FeedLine::Tick { timestamp, price } => MarketEvent::Tick(Tick::new(timestamp, price)),
    })
}

pub struct TickReader<R> {
    lines: Lines<R>,
    line_no: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin> TickReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            skipped: 0,
        }
    }

    /// Next well-formed event, or `None` at end of input.
    pub async fn next_event(&mut self) -> Result<Option<MarketEvent>, TickwiseError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => {
                    self.skipped += 1;
                    warn!(line = self.line_no, error = %err, "dropping malformed feed line");
                }
            }
        }
        Ok(None)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
