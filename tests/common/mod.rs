#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tickwise::adapters::sqlite_store::SqliteStore;
use tickwise::domain::brick::Brick;
use tickwise::domain::candle::Candle;
use tickwise::domain::engine::StrategyEngine;
use tickwise::domain::error::TickwiseError;
use tickwise::domain::indicator::{IndicatorResult, NotReady};
pub use tickwise::domain::order::{OrderIntent, OrderOutcome, OrderPurpose, OrderStatus};
pub use tickwise::domain::position::{ExitReason, Position, Side, Trade};
use tickwise::domain::settings::{EngineSettings, RetentionCaps, StrategyKind, StrategySettings};
use tickwise::domain::signal::{IndicatorSnapshot, Signal};
use tickwise::domain::strategy::{EntryCandidate, Evaluation, ScalePlan, SeriesUpdate, SignalRule};
pub use tickwise::domain::tick::{MarketEvent, Tick};
use tickwise::ports::event_port::EventSink;
use tickwise::ports::store_port::{CompactionReport, Namespace, StorePort};

// ---------------------------------------------------------------------------
// Event sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub signals: Mutex<Vec<(String, Signal)>>,
    pub trades: Mutex<Vec<(String, Trade)>>,
}

impl RecordingSink {
    pub fn trades(&self) -> Vec<Trade> {
        self.trades
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.lock().unwrap().len()
    }
}

impl EventSink for RecordingSink {
    fn on_signal(&self, strategy_id: &str, signal: &Signal) {
        self.signals
            .lock()
            .unwrap()
            .push((strategy_id.to_string(), signal.clone()));
    }

    fn on_trade_closed(&self, strategy_id: &str, trade: &Trade) {
        self.trades
            .lock()
            .unwrap()
            .push((strategy_id.to_string(), trade.clone()));
    }
}

// ---------------------------------------------------------------------------
// Store whose writes can be switched off
// ---------------------------------------------------------------------------

pub struct FailingStore {
    pub inner: SqliteStore,
    pub fail_writes: AtomicBool,
}

impl FailingStore {
    pub fn new() -> Self {
        let inner = SqliteStore::in_memory().unwrap();
        inner.initialize_schema().unwrap();
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), TickwiseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(TickwiseError::Database {
                reason: "disk I/O error".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl StorePort for FailingStore {
    fn save_position(&self, position: &Position) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.save_position(position)
    }

    fn load_position(&self, strategy: &str) -> Result<Option<Position>, TickwiseError> {
        self.inner.load_position(strategy)
    }

    fn clear_position(&self, strategy: &str) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.clear_position(strategy)
    }

    fn close_position(&self, trade: &Trade) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.close_position(trade)
    }

    fn append_bricks(&self, strategy: &str, bricks: &[Brick]) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.append_bricks(strategy, bricks)
    }

    fn load_bricks(&self, strategy: &str, limit: usize) -> Result<Vec<Brick>, TickwiseError> {
        self.inner.load_bricks(strategy, limit)
    }

    fn append_candle(&self, strategy: &str, candle: &Candle) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.append_candle(strategy, candle)
    }

    fn load_candles(&self, strategy: &str, limit: usize) -> Result<Vec<Candle>, TickwiseError> {
        self.inner.load_candles(strategy, limit)
    }

    fn append_price(&self, strategy: &str, tick: &Tick) -> Result<(), TickwiseError> {
        self.guard()?;
        self.inner.append_price(strategy, tick)
    }

    fn load_prices(&self, strategy: &str, limit: usize) -> Result<Vec<Tick>, TickwiseError> {
        self.inner.load_prices(strategy, limit)
    }

    fn load_trades(&self, strategy: &str, limit: usize) -> Result<Vec<Trade>, TickwiseError> {
        self.inner.load_trades(strategy, limit)
    }

    fn count(&self, strategy: &str, namespace: Namespace) -> Result<usize, TickwiseError> {
        self.inner.count(strategy, namespace)
    }

    fn compact(
        &self,
        strategy: &str,
        caps: &RetentionCaps,
    ) -> Result<CompactionReport, TickwiseError> {
        self.guard()?;
        self.inner.compact(strategy, caps)
    }
}

// ---------------------------------------------------------------------------
// Rule driven by the test
// ---------------------------------------------------------------------------

/// What [`ScriptedRule`] reports on its next evaluation.
#[derive(Debug, Clone)]
pub struct Script {
    pub ready: bool,
    pub entry: Option<EntryCandidate>,
    pub reversal: Option<String>,
    pub trailing_stop: Option<f64>,
    pub scale: Option<ScalePlan>,
    pub filter_bps: f64,
    pub atr_bps: f64,
    pub panic: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ready: true,
            entry: None,
            reversal: None,
            trailing_stop: None,
            scale: None,
            filter_bps: 5.0,
            atr_bps: 0.0,
            panic: false,
        }
    }
}

pub struct ScriptedRule {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedRule {
    pub fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            Self {
                script: Arc::clone(&script),
            },
            script,
        )
    }
}

impl SignalRule for ScriptedRule {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Trend
    }

    fn on_tick(&mut self, _tick: &Tick, _prices: &[f64]) -> SeriesUpdate {
        SeriesUpdate::default()
    }

    fn on_candle(&mut self, _candle: Candle) -> SeriesUpdate {
        SeriesUpdate::default()
    }

    fn restore(&mut self, _candles: Vec<Candle>, _bricks: Vec<Brick>) {}

    fn evaluate(&self, price: f64, prices: &[f64]) -> IndicatorResult<Evaluation> {
        let script = self.script.lock().unwrap();
        if script.panic {
            panic!("scripted evaluation failure");
        }
        if !script.ready {
            return Err(NotReady {
                have: prices.len(),
                need: prices.len() + 1,
            });
        }
        Ok(Evaluation {
            entry: script.entry.clone(),
            snapshot: IndicatorSnapshot {
                price,
                ..IndicatorSnapshot::default()
            },
            filter_bps: script.filter_bps,
            atr: price * script.atr_bps / 10_000.0,
            atr_bps: script.atr_bps,
        })
    }

    fn reversal(&self, _position: &Position, _price: f64, _now: i64, _eval: &Evaluation) -> Option<String> {
        self.script.lock().unwrap().reversal.clone()
    }

    fn trailing_stop(&self, _position: &Position, _price: f64, _eval: &Evaluation) -> Option<f64> {
        self.script.lock().unwrap().trailing_stop
    }

    fn scale_in(&self, _position: &Position, _price: f64, _now: i64, _eval: &Evaluation) -> Option<ScalePlan> {
        self.script.lock().unwrap().scale
    }
}

pub fn long_entry() -> Option<EntryCandidate> {
    Some(EntryCandidate {
        side: Side::Long,
        strength: 0.8,
        reason: "scripted long".into(),
        reference: None,
    })
}

pub fn short_entry() -> Option<EntryCandidate> {
    Some(EntryCandidate {
        side: Side::Short,
        strength: 0.8,
        reason: "scripted short".into(),
        reference: None,
    })
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn tick(timestamp: i64, price: f64) -> Tick {
    Tick::new(timestamp, price)
}

/// JSON-lines feed of `count` ticks one second apart, gently oscillating.
pub fn feed_text(count: usize) -> String {
    (0..count)
        .map(|i| {
            let price = 100.0 + (i as f64 * 0.3).sin() * 0.5;
            format!("{{\"timestamp\": {}, \"price\": {price}}}\n", 1_700_000_000_000i64 + i as i64 * 1_000)
        })
        .collect()
}

/// Settings for a scripted strategy: 50 bps stop, 100 bps target, one
/// minute max hold, a wide volatility band.
pub fn scripted_settings(id: &str) -> StrategySettings {
    let mut settings = StrategySettings::defaults(StrategyKind::Trend);
    settings.id = id.to_string();
    settings.min_strength = 0.0;
    settings.vol_min_bps = 0.0;
    settings.vol_max_bps = 1_000.0;
    settings.exits.stop_loss_bps = 50.0;
    settings.exits.take_profit_bps = 100.0;
    settings.exits.stop_loss_atr = 0.0;
    settings.exits.take_profit_atr = 0.0;
    settings.exits.max_hold_ms = 60_000;
    settings
}

pub fn engine_settings() -> EngineSettings {
    EngineSettings {
        persist_retries: 2,
        persist_backoff_ms: 0,
        ..EngineSettings::default()
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().unwrap();
    store.initialize_schema().unwrap();
    Arc::new(store)
}

pub fn recover_scripted(
    settings: StrategySettings,
    store: Arc<dyn StorePort>,
    sink: Arc<RecordingSink>,
) -> (StrategyEngine, Arc<Mutex<Script>>) {
    let (rule, script) = ScriptedRule::new();
    let engine =
        StrategyEngine::recover(settings, &engine_settings(), Box::new(rule), store, sink).unwrap();
    (engine, script)
}

pub fn accept(engine: &mut StrategyEngine, intents: &[OrderIntent]) {
    for intent in intents {
        engine
            .on_order_outcome(OrderOutcome {
                order_id: intent.order_id,
                status: OrderStatus::Accepted,
            })
            .unwrap();
    }
}

pub fn losing_trade(strategy: &str, closed_at: i64) -> Trade {
    Trade {
        strategy_id: strategy.to_string(),
        side: Side::Long,
        entry_price: 100.0,
        exit_price: 99.5,
        size: 1.0,
        pnl_pct: -0.5,
        opened_at: closed_at - 1_000,
        closed_at,
        exit_reason: ExitReason::StopLoss,
    }
}

pub fn long_position(strategy: &str, entry: f64, stop: f64, target: f64, opened_at: i64) -> Position {
    Position {
        strategy_id: strategy.to_string(),
        side: Side::Long,
        entry_price: entry,
        size: 1.0,
        stop_loss: stop,
        take_profit: target,
        opened_at,
        reference: None,
        scaled_entries: Vec::new(),
    }
}

pub const RUN_INI: &str = r#"
[sqlite]
path = {db}
pool_size = 2

[engine]
feed_capacity = 4096
compaction_interval_secs = 60

[trend]
enabled = true

[divergence]
enabled = true

[breakout]
enabled = false
"#;

/// Config text pointing at `db`.
pub fn config_text(db: &std::path::Path) -> String {
    RUN_INI.replace("{db}", &db.display().to_string())
}
