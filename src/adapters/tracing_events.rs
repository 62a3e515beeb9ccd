//! Event sink that writes signals and closed trades to the log.
//!
//! Uses the `tickwise::events` target so the stream can be filtered or
//! routed on its own, e.g. `RUST_LOG=tickwise::events=info`.

use crate::domain::position::Trade;
use crate::domain::signal::Signal;
use crate::ports::event_port::EventSink;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn on_signal(&self, strategy_id: &str, signal: &Signal) {
        let snap = &signal.snapshot;
        info!(
            target: "tickwise::events",
            strategy = strategy_id,
            kind = %signal.kind,
            strength = signal.strength,
            reason = %signal.reason,
            price = snap.price,
            rsi = ?snap.rsi,
            bb_position = ?snap.bb_position,
            atr_bps = ?snap.atr_bps,
            volatility_bps = ?snap.volatility_bps,
            momentum = ?snap.momentum,
            "signal"
        );
    }

    fn on_trade_closed(&self, strategy_id: &str, trade: &Trade) {
        info!(
            target: "tickwise::events",
            strategy = strategy_id,
            side = %trade.side,
            entry = trade.entry_price,
            exit = trade.exit_price,
            size = trade.size,
            pnl_pct = trade.pnl_pct,
            hold_secs = trade.duration_ms() / 1000,
            reason = trade.exit_reason.as_str(),
            "trade closed"
        );
    }
}
