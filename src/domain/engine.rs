//! Per-strategy engine: windows, position state machine and persistence.
//!
//! A [`StrategyEngine`] is owned by exactly one task. Every call is
//! synchronous and runs to completion, so an evaluation is never observed
//! half-applied. Calls block on store writes and on the retry backoff between
//! them; async callers run them on a blocking thread. Order placement is not performed here: entry, scale-in and
//! exit decisions come back as [`OrderIntent`]s and their fills arrive later
//! through [`StrategyEngine::on_order_outcome`].
//!
//! ```text
//! Flat --entry signal--> Entering --accepted--> Open --exit--> Exiting --accepted--> Flat
//!                           |rejected                            |rejected
//!                           v                                    v
//!                          Flat                                 Open
//! ```

use crate::domain::brick::Brick;
use crate::domain::candle::Candle;
use crate::domain::error::TickwiseError;
use crate::domain::metrics::TradeStats;
use crate::domain::order::{OrderIntent, OrderOutcome, OrderPurpose, OrderSide, OrderStatus};
use crate::domain::position::{ExitReason, Position, Side, Trade};
use crate::domain::risk::AdaptiveRiskState;
use crate::domain::settings::{EngineSettings, StrategySettings};
use crate::domain::signal::{Signal, SignalKind};
use crate::domain::strategy::{EntryCandidate, Evaluation, SeriesUpdate, SignalRule};
use crate::domain::tick::{MarketEvent, Tick};
use crate::domain::window::BoundedWindow;
use crate::ports::event_port::EventSink;
use crate::ports::store_port::{CompactionReport, StorePort};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A scale-in order waiting for its fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingScale {
    pub order_id: u64,
    pub price: f64,
    pub size: f64,
    pub at: i64,
    /// Stop distance after the add, in bps of the new average entry.
    pub stop_bps: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionState {
    Flat,
    Entering {
        position: Position,
        order_id: u64,
    },
    Open {
        position: Position,
        pending_scale: Option<PendingScale>,
    },
    Exiting {
        position: Position,
        reason: ExitReason,
        exit_price: f64,
        order_id: u64,
    },
}

impl PositionState {
    pub fn name(&self) -> &'static str {
        match self {
            PositionState::Flat => "flat",
            PositionState::Entering { .. } => "entering",
            PositionState::Open { .. } => "open",
            PositionState::Exiting { .. } => "exiting",
        }
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            PositionState::Flat => None,
            PositionState::Entering { position, .. }
            | PositionState::Open { position, .. }
            | PositionState::Exiting { position, .. } => Some(position),
        }
    }
}

/// Bounded-retry writer in front of the shared store.
struct Persister {
    store: Arc<dyn StorePort>,
    strategy: String,
    retries: u32,
    backoff_ms: u64,
}

impl Persister {
    fn write<F>(&self, what: &str, mut op: F) -> Result<(), TickwiseError>
    where
        F: FnMut(&dyn StorePort, &str) -> Result<(), TickwiseError>,
    {
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            match op(self.store.as_ref(), &self.strategy) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        strategy = %self.strategy,
                        what,
                        attempt,
                        error = %err,
                        "persistence write failed"
                    );
                    last_error = err.to_string();
                    if attempt < self.retries {
                        std::thread::sleep(Duration::from_millis(
                            self.backoff_ms * u64::from(attempt),
                        ));
                    }
                }
            }
        }
        Err(TickwiseError::PersistenceWrite {
            strategy: self.strategy.clone(),
            attempts: self.retries,
            reason: last_error,
        })
    }
}

pub struct StrategyEngine {
    settings: StrategySettings,
    rule: Box<dyn SignalRule>,
    prices: BoundedWindow<f64>,
    last_tick: Option<Tick>,
    state: PositionState,
    recent_trades: BoundedWindow<Trade>,
    halted: bool,
    persister: Persister,
    sink: Arc<dyn EventSink>,
    next_order_id: u64,
}

impl StrategyEngine {
    /// Rebuilds the engine from the store. Fails with `RecoveryMismatch`
    /// when the stored windows cannot back the stored position.
    pub fn recover(
        settings: StrategySettings,
        engine: &EngineSettings,
        mut rule: Box<dyn SignalRule>,
        store: Arc<dyn StorePort>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, TickwiseError> {
        let id = settings.id.clone();
        let caps = settings.caps;

        let ticks = store.load_prices(&id, caps.prices)?;
        let candles = store.load_candles(&id, caps.candles)?;
        let bricks = store.load_bricks(&id, caps.bricks)?;
        let position = store.load_position(&id)?;
        let trades = store.load_trades(&id, engine.recent_trades)?;

        check_windows(&id, &ticks, &candles, &bricks)?;
        if let Some(position) = &position {
            check_position(&id, position, &ticks)?;
        }

        info!(
            strategy = %id,
            prices = ticks.len(),
            candles = candles.len(),
            bricks = bricks.len(),
            trades = trades.len(),
            open_position = position.is_some(),
            "strategy state recovered"
        );

        rule.restore(candles, bricks);
        let prices = BoundedWindow::seeded(caps.prices, ticks.iter().map(|t| t.price));
        let state = match position {
            Some(position) => PositionState::Open {
                position,
                pending_scale: None,
            },
            None => PositionState::Flat,
        };

        Ok(Self {
            persister: Persister {
                store,
                strategy: id,
                retries: engine.persist_retries.max(1),
                backoff_ms: engine.persist_backoff_ms,
            },
            settings,
            rule,
            prices,
            last_tick: ticks.last().copied(),
            state,
            recent_trades: BoundedWindow::seeded(engine.recent_trades, trades),
            halted: false,
            sink,
            next_order_id: 1,
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.state.position()
    }

    /// True once a write has failed past its retries; new entries stay off
    /// until restart.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn awaiting_outcome(&self) -> bool {
        matches!(
            self.state,
            PositionState::Entering { .. }
                | PositionState::Exiting { .. }
                | PositionState::Open {
                    pending_scale: Some(_),
                    ..
                }
        )
    }

    pub fn price_count(&self) -> usize {
        self.prices.len()
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.last_tick
    }

    pub fn recent_trades(&self) -> Vec<Trade> {
        self.recent_trades.to_vec()
    }

    pub fn on_event(&mut self, event: MarketEvent) -> Result<Vec<OrderIntent>, TickwiseError> {
        match event {
            MarketEvent::Tick(tick) => self.on_tick(tick),
            MarketEvent::Candle(candle) => Ok(self.on_candle(candle)),
        }
    }

    /// Folds a tick into every window and runs one evaluation cycle.
    /// A malformed tick is rejected before anything is touched.
    pub fn on_tick(&mut self, tick: Tick) -> Result<Vec<OrderIntent>, TickwiseError> {
        tick.validate(self.last_tick.map(|t| t.timestamp))?;

        self.prices.push(tick.price);
        self.last_tick = Some(tick);
        if !self.halted {
            let result = self
                .persister
                .write("price", |store, id| store.append_price(id, &tick));
            self.check_write(result);
        }

        let prices = self.prices.to_vec();
        let update = self.rule.on_tick(&tick, &prices);
        self.persist_update(&update);

        Ok(self.decide(tick.price, tick.timestamp, &prices))
    }

    /// Folds in a candle supplied by the feed. A newly closed candle triggers
    /// an evaluation at the last seen price.
    pub fn on_candle(&mut self, candle: Candle) -> Vec<OrderIntent> {
        let update = self.rule.on_candle(candle);
        self.persist_update(&update);

        match self.last_tick {
            Some(tick) if update.candle.is_some() => {
                let prices = self.prices.to_vec();
                self.decide(tick.price, tick.timestamp, &prices)
            }
            _ => Vec::new(),
        }
    }

    pub fn on_order_outcome(&mut self, outcome: OrderOutcome) -> Result<(), TickwiseError> {
        let state = std::mem::replace(&mut self.state, PositionState::Flat);
        let strategy = self.settings.id.clone();

        match state {
            PositionState::Entering { position, order_id } if order_id == outcome.order_id => {
                match outcome.status {
                    OrderStatus::Accepted => {
                        info!(
                            strategy = %strategy,
                            side = %position.side,
                            entry = position.entry_price,
                            size = position.size,
                            "position opened"
                        );
                        self.state = PositionState::Open {
                            position,
                            pending_scale: None,
                        };
                        Ok(())
                    }
                    OrderStatus::Rejected(reason) => {
                        let result = self
                            .persister
                            .write("position", |store, id| store.clear_position(id));
                        self.check_write(result);
                        Err(TickwiseError::OrderRejected { strategy, reason })
                    }
                }
            }

            PositionState::Exiting {
                position,
                reason,
                exit_price,
                order_id,
            } if order_id == outcome.order_id => match outcome.status {
                OrderStatus::Accepted => {
                    let closed_at = self.now().max(position.opened_at);
                    let trade = position.close(exit_price, closed_at, reason);
                    let result = self
                        .persister
                        .write("trade", |store, _| store.close_position(&trade));
                    self.check_write(result);

                    info!(
                        strategy = %strategy,
                        side = %trade.side,
                        entry = trade.entry_price,
                        exit = trade.exit_price,
                        pnl_pct = trade.pnl_pct,
                        reason = trade.exit_reason.as_str(),
                        "position closed"
                    );
                    self.sink.on_trade_closed(&strategy, &trade);
                    self.recent_trades.push(trade);
                    Ok(())
                }
                OrderStatus::Rejected(reason) => {
                    self.state = PositionState::Open {
                        position,
                        pending_scale: None,
                    };
                    Err(TickwiseError::OrderRejected { strategy, reason })
                }
            },

            PositionState::Open {
                mut position,
                pending_scale: Some(pending),
            } if pending.order_id == outcome.order_id => match outcome.status {
                OrderStatus::Accepted => {
                    position.add_scale(pending.price, pending.size, pending.at);
                    let sign = position.side.sign();
                    position.stop_loss = position.entry_price * (1.0 - sign * pending.stop_bps / 10_000.0);
                    info!(
                        strategy = %strategy,
                        scales = position.scale_count(),
                        avg_entry = position.entry_price,
                        size = position.size,
                        stop_loss = position.stop_loss,
                        "scaled into position"
                    );
                    let result = self
                        .persister
                        .write("position", |store, _| store.save_position(&position));
                    self.check_write(result);
                    self.state = PositionState::Open {
                        position,
                        pending_scale: None,
                    };
                    Ok(())
                }
                OrderStatus::Rejected(reason) => {
                    self.state = PositionState::Open {
                        position,
                        pending_scale: None,
                    };
                    Err(TickwiseError::OrderRejected { strategy, reason })
                }
            },

            other => {
                warn!(
                    strategy = %strategy,
                    order_id = outcome.order_id,
                    state = other.name(),
                    "ignoring outcome for unknown order"
                );
                self.state = other;
                Ok(())
            }
        }
    }

    /// Trims the stored windows to their caps.
    pub fn compact(&self) -> Result<CompactionReport, TickwiseError> {
        self.persister
            .store
            .compact(&self.settings.id, &self.settings.caps)
    }

    /// Statistics over the full stored trade log.
    pub fn trade_stats(&self) -> Result<TradeStats, TickwiseError> {
        let trades = self.persister.store.load_trades(&self.settings.id, usize::MAX)?;
        Ok(TradeStats::compute(&trades))
    }

    fn now(&self) -> i64 {
        self.last_tick.map(|t| t.timestamp).unwrap_or_default()
    }

    fn decide(&mut self, price: f64, now: i64, prices: &[f64]) -> Vec<OrderIntent> {
        let eval = match self.rule.evaluate(price, prices) {
            Ok(eval) => Some(eval),
            Err(not_ready) => {
                debug!(strategy = %self.settings.id, %not_ready, "indicators warming up");
                None
            }
        };

        let state = std::mem::replace(&mut self.state, PositionState::Flat);
        let (next, intents) = match state {
            PositionState::Flat => self.consider_entry(price, now, eval.as_ref()),
            PositionState::Open {
                position,
                pending_scale: None,
            } => self.manage_open(position, price, now, eval.as_ref()),
            waiting => (waiting, Vec::new()),
        };
        self.state = next;
        intents
    }

    fn consider_entry(
        &mut self,
        price: f64,
        now: i64,
        eval: Option<&Evaluation>,
    ) -> (PositionState, Vec<OrderIntent>) {
        let flat = (PositionState::Flat, Vec::new());
        let Some(eval) = eval else {
            return flat;
        };
        let Some(candidate) = eval.entry.as_ref() else {
            return flat;
        };
        if !self.passes_filters(candidate, eval, now) {
            return flat;
        }

        let s = &self.settings;
        let risk = AdaptiveRiskState::derive(
            &self.recent_trades.to_vec(),
            Some(eval.filter_bps),
            &s.risk,
        );
        let size = (s.base_size * risk.size_multiplier(&s.risk)).max(s.min_size);
        let sign = candidate.side.sign();
        let stop_bps = s.exits.stop_distance_bps(eval.atr_bps);
        let target_bps = s.exits.target_distance_bps(eval.atr_bps);

        let position = Position {
            strategy_id: s.id.clone(),
            side: candidate.side,
            entry_price: price,
            size,
            stop_loss: level(price, -sign, stop_bps),
            take_profit: level(price, sign, target_bps),
            opened_at: now,
            reference: candidate.reference,
            scaled_entries: Vec::new(),
        };

        let result = self
            .persister
            .write("position", |store, _| store.save_position(&position));
        if !self.check_write(result) {
            return flat;
        }

        let kind = match candidate.side {
            Side::Long => SignalKind::EntryLong,
            Side::Short => SignalKind::EntryShort,
        };
        let signal = Signal::new(
            kind,
            candidate.strength,
            candidate.reason.clone(),
            eval.snapshot.clone(),
        );
        self.sink.on_signal(&self.settings.id, &signal);

        info!(
            strategy = %self.settings.id,
            side = %position.side,
            price,
            size,
            stop_loss = position.stop_loss,
            take_profit = position.take_profit,
            regime = ?risk.volatility_regime,
            "entering position"
        );

        let order_id = self.order_id();
        let intent = OrderIntent {
            strategy_id: self.settings.id.clone(),
            order_id,
            purpose: OrderPurpose::Entry,
            side: OrderSide::opening(position.side),
            size,
            price_hint: price,
        };
        (PositionState::Entering { position, order_id }, vec![intent])
    }

    fn passes_filters(&self, candidate: &EntryCandidate, eval: &Evaluation, now: i64) -> bool {
        let s = &self.settings;
        let id = &s.id;
        if self.halted {
            debug!(strategy = %id, "entry suppressed: persistence halted");
            return false;
        }
        if eval.filter_bps < s.vol_min_bps || eval.filter_bps > s.vol_max_bps {
            debug!(strategy = %id, volatility_bps = eval.filter_bps, "entry outside volatility band");
            return false;
        }
        if candidate.strength < s.min_strength {
            debug!(strategy = %id, strength = candidate.strength, "entry below minimum strength");
            return false;
        }
        let risk = AdaptiveRiskState::derive(
            &self.recent_trades.to_vec(),
            Some(eval.filter_bps),
            &s.risk,
        );
        if let Some(block) = risk.entry_block(now, &s.risk) {
            info!(
                strategy = %id,
                ?block,
                consecutive_losses = risk.consecutive_losses,
                "entry suppressed by adaptive risk"
            );
            return false;
        }
        true
    }

    fn manage_open(
        &mut self,
        mut position: Position,
        price: f64,
        now: i64,
        eval: Option<&Evaluation>,
    ) -> (PositionState, Vec<OrderIntent>) {
        if let Some((reason, detail)) = self.exit_condition(&position, price, now, eval) {
            let signal = Signal::new(
                SignalKind::Exit,
                1.0,
                detail,
                eval.map(|e| e.snapshot.clone()).unwrap_or_default(),
            );
            self.sink.on_signal(&self.settings.id, &signal);
            info!(
                strategy = %self.settings.id,
                reason = reason.as_str(),
                price,
                pnl_pct = position.pnl_pct(price),
                "exiting position"
            );

            let order_id = self.order_id();
            let intent = OrderIntent {
                strategy_id: self.settings.id.clone(),
                order_id,
                purpose: OrderPurpose::Exit,
                side: OrderSide::closing(position.side),
                size: position.size,
                price_hint: price,
            };
            let state = PositionState::Exiting {
                position,
                reason,
                exit_price: price,
                order_id,
            };
            return (state, vec![intent]);
        }

        let Some(eval) = eval else {
            return (
                PositionState::Open {
                    position,
                    pending_scale: None,
                },
                Vec::new(),
            );
        };

        if let Some(stop) = self.rule.trailing_stop(&position, price, eval) {
            if position.tighten_stop(stop) {
                debug!(strategy = %self.settings.id, stop_loss = stop, "trailing stop moved");
                let result = self
                    .persister
                    .write("position", |store, _| store.save_position(&position));
                self.check_write(result);
            }
        }

        let mut intents = Vec::new();
        let mut pending_scale = None;
        if !self.halted {
            if let Some(plan) = self.rule.scale_in(&position, price, now, eval) {
                if plan.size > 0.0 {
                    let order_id = self.order_id();
                    let base_bps = self.settings.exits.stop_distance_bps(eval.atr_bps);
                    info!(
                        strategy = %self.settings.id,
                        price,
                        size = plan.size,
                        scales = position.scale_count() + 1,
                        "scaling into position"
                    );
                    intents.push(OrderIntent {
                        strategy_id: self.settings.id.clone(),
                        order_id,
                        purpose: OrderPurpose::ScaleIn,
                        side: OrderSide::opening(position.side),
                        size: plan.size,
                        price_hint: price,
                    });
                    pending_scale = Some(PendingScale {
                        order_id,
                        price,
                        size: plan.size,
                        at: now,
                        stop_bps: base_bps * plan.stop_widen_factor,
                    });
                }
            }
        }

        (
            PositionState::Open {
                position,
                pending_scale,
            },
            intents,
        )
    }

    /// First matching exit in priority order: stop-loss, take-profit,
    /// reversal, max hold. Reversal alone needs indicators.
    fn exit_condition(
        &self,
        position: &Position,
        price: f64,
        now: i64,
        eval: Option<&Evaluation>,
    ) -> Option<(ExitReason, String)> {
        if position.should_stop_loss(price) {
            return Some((
                ExitReason::StopLoss,
                format!("stop loss {:.4} touched at {price:.4}", position.stop_loss),
            ));
        }
        if position.should_take_profit(price) {
            return Some((
                ExitReason::TakeProfit,
                format!("take profit {:.4} touched at {price:.4}", position.take_profit),
            ));
        }
        if let Some(eval) = eval {
            if let Some(detail) = self.rule.reversal(position, price, now, eval) {
                return Some((ExitReason::Reversal, detail));
            }
        }
        let max_hold = self.settings.exits.max_hold_ms;
        if max_hold > 0 && position.held_ms(now) >= max_hold {
            return Some((
                ExitReason::MaxHold,
                format!("held {}s", position.held_ms(now) / 1000),
            ));
        }
        None
    }

    fn persist_update(&mut self, update: &SeriesUpdate) {
        if self.halted {
            return;
        }
        if !update.bricks.is_empty() {
            let result = self
                .persister
                .write("bricks", |store, id| store.append_bricks(id, &update.bricks));
            self.check_write(result);
        }
        if let Some(candle) = &update.candle {
            let result = self
                .persister
                .write("candle", |store, id| store.append_candle(id, candle));
            self.check_write(result);
        }
    }

    /// Halts new entries on a failed write. Returns whether the write succeeded.
    fn check_write(&mut self, result: Result<(), TickwiseError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                if !self.halted {
                    error!(
                        strategy = %self.settings.id,
                        error = %err,
                        open_position = self.state.position().is_some(),
                        "persistence unavailable; halting new entries"
                    );
                }
                self.halted = true;
                false
            }
        }
    }

    fn order_id(&mut self) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }
}

/// Price `distance_bps` away from `price` in `direction` (+1 up, -1 down).
/// A zero distance disables the level.
fn level(price: f64, direction: f64, distance_bps: f64) -> f64 {
    if distance_bps > 0.0 {
        price * (1.0 + direction * distance_bps / 10_000.0)
    } else {
        0.0
    }
}

fn mismatch(strategy: &str, reason: impl Into<String>) -> TickwiseError {
    let err = TickwiseError::RecoveryMismatch {
        strategy: strategy.to_string(),
        reason: reason.into(),
    };
    error!(strategy, error = %err, "recovery blocked");
    err
}

fn check_windows(
    strategy: &str,
    ticks: &[Tick],
    candles: &[Candle],
    bricks: &[Brick],
) -> Result<(), TickwiseError> {
    if ticks.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
        return Err(mismatch(strategy, "price history out of order"));
    }
    if candles.windows(2).any(|w| w[1].open_time <= w[0].open_time) {
        return Err(mismatch(strategy, "candle window out of order"));
    }
    if bricks.windows(2).any(|w| w[1].open_time < w[0].open_time) {
        return Err(mismatch(strategy, "brick window out of order"));
    }
    Ok(())
}

fn check_position(strategy: &str, position: &Position, ticks: &[Tick]) -> Result<(), TickwiseError> {
    if position.strategy_id != strategy {
        return Err(mismatch(
            strategy,
            format!("stored position belongs to {}", position.strategy_id),
        ));
    }
    match ticks.last() {
        None => Err(mismatch(strategy, "open position without price history")),
        Some(last) if last.timestamp < position.opened_at => Err(mismatch(
            strategy,
            format!(
                "price history ends at {} before position opened at {}",
                last.timestamp, position.opened_at
            ),
        )),
        Some(_) => Ok(()),
    }
}
