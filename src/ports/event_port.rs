//! Outbound notifications for telemetry and analytics.

use crate::domain::position::Trade;
use crate::domain::signal::Signal;

pub trait EventSink: Send + Sync {
    fn on_signal(&self, strategy_id: &str, signal: &Signal);
    fn on_trade_closed(&self, strategy_id: &str, trade: &Trade);
}
