//! Orchestrator tests: fan-out, order round trips, shutdown and fault isolation.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tickwise::adapters::paper_execution::PaperExecution;
use tickwise::adapters::tick_source::TickReader;
use tickwise::domain::engine::StrategyEngine;
use tickwise::domain::settings::{EngineSettings, StrategyKind, StrategySettings};
use tickwise::domain::strategy::build_rule;
use tickwise::orchestrator::{Orchestrator, pump};
use tickwise::ports::execution_port::ExecutionPort;
use tickwise::ports::store_port::{Namespace, StorePort};

const HOUR: Duration = Duration::from_secs(3_600);

fn real_engine(kind: StrategyKind, store: Arc<dyn StorePort>) -> StrategyEngine {
    let settings = StrategySettings::defaults(kind);
    let rule = build_rule(&settings);
    StrategyEngine::recover(
        settings,
        &engine_settings(),
        rule,
        store,
        Arc::new(RecordingSink::default()),
    )
    .unwrap()
}

fn paper() -> Arc<dyn ExecutionPort> {
    Arc::new(PaperExecution::default())
}

#[tokio::test]
async fn every_strategy_sees_every_tick() {
    let store = memory_store();
    let mut orchestrator = Orchestrator::new(1_024);
    orchestrator.spawn(real_engine(StrategyKind::Trend, store.clone()), paper(), HOUR);
    orchestrator.spawn(real_engine(StrategyKind::Divergence, store.clone()), paper(), HOUR);
    orchestrator.spawn(real_engine(StrategyKind::Breakout, store.clone()), paper(), HOUR);

    let text = feed_text(300);
    let published = pump(TickReader::new(text.as_bytes()), orchestrator.publisher())
        .await
        .unwrap();
    assert_eq!(published, 300);

    let summaries = orchestrator.join().await;
    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        assert_eq!(summary.events, 300, "{}", summary.id);
        assert_eq!(summary.lagged, 0);
        assert_eq!(summary.malformed, 0);
        assert!(!summary.halted);
        assert!(summary.stats.is_some());
        assert_eq!(store.count(&summary.id, Namespace::PriceHistory).unwrap(), 300);
    }
    assert!(store.count("divergence", Namespace::Bricks).unwrap() > 0);
}

#[tokio::test]
async fn malformed_events_are_counted_and_skipped() {
    let store = memory_store();
    let mut orchestrator = Orchestrator::new(64);
    orchestrator.spawn(real_engine(StrategyKind::Trend, store.clone()), paper(), HOUR);

    let publisher = orchestrator.publisher();
    assert!(publisher.publish(MarketEvent::Tick(tick(2_000, 100.0))));
    assert!(publisher.publish(MarketEvent::Tick(tick(1_000, 100.0))));
    assert!(publisher.publish(MarketEvent::Tick(tick(3_000, -5.0))));
    assert!(publisher.publish(MarketEvent::Tick(tick(3_000, 100.1))));
    drop(publisher);

    let summaries = orchestrator.join().await;
    assert_eq!(summaries[0].events, 4);
    assert_eq!(summaries[0].malformed, 2);
    assert_eq!(store.count("trend", Namespace::PriceHistory).unwrap(), 2);
}

#[tokio::test]
async fn fills_come_back_as_separate_events() {
    let store = memory_store();
    let sink = Arc::new(RecordingSink::default());
    let (engine, script) = recover_scripted(scripted_settings("alpha"), store.clone(), sink);
    script.lock().unwrap().entry = long_entry();

    let mut orchestrator = Orchestrator::new(64);
    orchestrator.spawn(engine, paper(), HOUR);

    let publisher = orchestrator.publisher();
    for i in 0..5 {
        publisher.publish(MarketEvent::Tick(tick(1_000 + i * 100, 100.0)));
    }
    drop(publisher);

    let summaries = orchestrator.join().await;
    let summary = &summaries[0];
    assert_eq!(summary.orders, 1);
    assert_eq!(summary.rejected, 0);
    assert!(summary.open_position);
    assert!(store.load_position("alpha").unwrap().is_some());
}

#[tokio::test]
async fn rejected_orders_leave_strategy_flat() {
    let store = memory_store();
    let sink = Arc::new(RecordingSink::default());
    let (engine, script) = recover_scripted(scripted_settings("alpha"), store.clone(), sink);
    script.lock().unwrap().entry = long_entry();

    let mut orchestrator = Orchestrator::new(64);
    // base size 1.0 is over the limit
    orchestrator.spawn(engine, Arc::new(PaperExecution::new(0.5)), HOUR);

    let publisher = orchestrator.publisher();
    for i in 0..5 {
        publisher.publish(MarketEvent::Tick(tick(1_000 + i * 100, 100.0)));
    }
    drop(publisher);

    let summaries = orchestrator.join().await;
    let summary = &summaries[0];
    assert!(summary.orders >= 1);
    assert_eq!(summary.rejected, summary.orders);
    assert!(!summary.open_position);
    assert!(store.load_position("alpha").unwrap().is_none());
}

#[tokio::test]
async fn shutdown_stops_tasks_without_closing_feed() {
    let store = memory_store();
    let mut orchestrator = Orchestrator::new(64);
    orchestrator.spawn(real_engine(StrategyKind::Trend, store.clone()), paper(), HOUR);

    // a live publisher would otherwise keep the task waiting forever
    let publisher = orchestrator.publisher();
    publisher.publish(MarketEvent::Tick(tick(1_000, 100.0)));
    orchestrator.shutdown();

    let summaries = tokio::time::timeout(Duration::from_secs(5), orchestrator.join())
        .await
        .expect("tasks did not stop");
    assert_eq!(summaries.len(), 1);
    assert!(summaries[0].events <= 1);
    drop(publisher);
}

#[tokio::test]
async fn panicking_strategy_does_not_stop_the_others() {
    let store = memory_store();
    let sink = Arc::new(RecordingSink::default());
    let (faulty, script) = recover_scripted(scripted_settings("faulty"), store.clone(), sink);
    script.lock().unwrap().panic = true;

    let mut orchestrator = Orchestrator::new(1_024);
    orchestrator.spawn(faulty, paper(), HOUR);
    orchestrator.spawn(real_engine(StrategyKind::Trend, store.clone()), paper(), HOUR);

    let text = feed_text(50);
    pump(TickReader::new(text.as_bytes()), orchestrator.publisher())
        .await
        .unwrap();

    let summaries = orchestrator.join().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, "trend");
    assert_eq!(summaries[0].events, 50);
}

#[tokio::test]
async fn compaction_runs_on_interval() {
    let store = memory_store();
    let mut settings = scripted_settings("alpha");
    settings.caps.prices = 5;
    let sink = Arc::new(RecordingSink::default());
    let (engine, _script) = recover_scripted(settings, store.clone(), sink);

    let mut orchestrator = Orchestrator::new(64);
    orchestrator.spawn(engine, paper(), Duration::from_millis(20));

    let publisher = orchestrator.publisher();
    for i in 0..20 {
        publisher.publish(MarketEvent::Tick(tick(i * 100, 100.0)));
    }

    let mut trimmed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if store.count("alpha", Namespace::PriceHistory).unwrap() == 5 {
            trimmed = true;
            break;
        }
    }
    drop(publisher);
    orchestrator.join().await;
    assert!(trimmed, "price history was never compacted");
}

#[tokio::test]
async fn write_retries_do_not_stall_other_tasks() {
    let store = Arc::new(FailingStore::new());
    let (rule, _script) = ScriptedRule::new();
    let slow_retries = EngineSettings {
        persist_retries: 3,
        persist_backoff_ms: 200,
        ..EngineSettings::default()
    };
    let engine = StrategyEngine::recover(
        scripted_settings("alpha"),
        &slow_retries,
        Box::new(rule),
        store.clone(),
        Arc::new(RecordingSink::default()),
    )
    .unwrap();
    store.set_failing(true);

    let mut orchestrator = Orchestrator::new(64);
    orchestrator.spawn(engine, paper(), HOUR);
    let publisher = orchestrator.publisher();
    publisher.publish(MarketEvent::Tick(tick(1_000, 100.0)));

    // the price write now spends ~600ms in backoff; this runtime has one thread
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(
        started.elapsed() < Duration::from_millis(300),
        "runtime stalled for {:?}",
        started.elapsed()
    );

    drop(publisher);
    let summaries = orchestrator.join().await;
    assert_eq!(summaries[0].events, 1);
    assert!(summaries[0].halted);
}
