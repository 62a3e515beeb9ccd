//! Fan-out of the shared feed to one task per strategy.
//!
//! Every strategy task owns its [`StrategyEngine`] outright; the only shared
//! pieces are the broadcast feed, the store behind the engines and the
//! execution collaborator. A receiver that falls behind skips ahead and logs
//! how much it missed, so a slow strategy never holds up the others.
//!
//! Order placement is spawned off the task and the fill comes back on the
//! task's own outcome channel, handled as a separate event. Engine calls hit
//! the store, so they run on tokio's blocking pool.

use crate::adapters::tick_source::TickReader;
use crate::domain::engine::StrategyEngine;
use crate::domain::error::TickwiseError;
use crate::domain::metrics::TradeStats;
use crate::domain::order::{OrderIntent, OrderOutcome};
use crate::domain::tick::MarketEvent;
use crate::ports::execution_port::ExecutionPort;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How long a stopping task waits for fills of orders it already placed.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-strategy counters reported when a task exits.
#[derive(Debug, Clone, Default)]
pub struct StrategySummary {
    pub id: String,
    pub events: u64,
    pub lagged: u64,
    pub malformed: u64,
    pub orders: u64,
    pub rejected: u64,
    pub halted: bool,
    pub open_position: bool,
    pub stats: Option<TradeStats>,
}

/// Cloneable handle for pushing events onto the feed.
#[derive(Clone)]
pub struct FeedPublisher {
    sender: broadcast::Sender<MarketEvent>,
}

impl FeedPublisher {
    /// Returns false when no strategy task is listening any more.
    pub fn publish(&self, event: MarketEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

pub struct Orchestrator {
    feed: broadcast::Sender<MarketEvent>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<StrategySummary>)>,
}

impl Orchestrator {
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            feed,
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn spawn(
        &mut self,
        engine: StrategyEngine,
        execution: Arc<dyn ExecutionPort>,
        compaction_every: Duration,
    ) {
        let id = engine.id().to_string();
        let feed = self.feed.subscribe();
        let shutdown = self.shutdown.subscribe();
        info!(strategy = %id, "starting strategy task");
        let handle = tokio::spawn(run_strategy(
            engine,
            execution,
            feed,
            shutdown,
            compaction_every,
        ));
        self.tasks.push((id, handle));
    }

    pub fn publisher(&self) -> FeedPublisher {
        FeedPublisher {
            sender: self.feed.clone(),
        }
    }

    pub fn strategy_count(&self) -> usize {
        self.tasks.len()
    }

    /// Asks every task to stop after the event it is handling.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Closes the feed and waits for every task. Tasks drain events already
    /// queued unless shutdown was requested first. A task that panicked is
    /// logged and left out of the result.
    pub async fn join(self) -> Vec<StrategySummary> {
        let Self {
            feed,
            shutdown,
            tasks,
        } = self;
        drop(feed);

        let mut summaries = Vec::with_capacity(tasks.len());
        for (id, handle) in tasks {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(err) => error!(strategy = %id, error = %err, "strategy task failed"),
            }
        }
        drop(shutdown);
        summaries
    }
}

/// Reads the feed to the end and publishes every event.
pub async fn pump<R: AsyncBufRead + Unpin>(
    mut reader: TickReader<R>,
    publisher: FeedPublisher,
) -> Result<u64, TickwiseError> {
    let mut published = 0u64;
    while let Some(event) = reader.next_event().await? {
        if !publisher.publish(event) {
            warn!("no strategy is listening; stopping feed");
            break;
        }
        published += 1;
        tokio::task::yield_now().await;
    }
    info!(published, skipped = reader.skipped(), "feed finished");
    Ok(published)
}

enum Step {
    Outcome(OrderOutcome),
    Event(MarketEvent),
    Compact,
}

async fn run_strategy(
    mut engine: StrategyEngine,
    execution: Arc<dyn ExecutionPort>,
    mut feed: broadcast::Receiver<MarketEvent>,
    mut shutdown: watch::Receiver<bool>,
    compaction_every: Duration,
) -> StrategySummary {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<OrderOutcome>();
    let mut compaction = tokio::time::interval_at(Instant::now() + compaction_every, compaction_every);
    compaction.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = StrategySummary {
        id: engine.id().to_string(),
        ..StrategySummary::default()
    };
    let mut in_flight = 0usize;

    loop {
        if *shutdown.borrow() {
            info!(strategy = %summary.id, "shutdown requested");
            break;
        }

        let step = tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }

            Some(outcome) = outcome_rx.recv() => Step::Outcome(outcome),

            received = feed.recv() => match received {
                Ok(event) => Step::Event(event),
                Err(RecvError::Lagged(skipped)) => {
                    summary.lagged += skipped;
                    warn!(strategy = %summary.id, skipped, "feed receiver lagged; skipping ahead");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!(strategy = %summary.id, "feed closed");
                    break;
                }
            },

            _ = compaction.tick() => Step::Compact,
        };

        match step {
            Step::Outcome(outcome) => {
                in_flight = in_flight.saturating_sub(1);
                let Some((back, result)) =
                    off_runtime(engine, move |e| e.on_order_outcome(outcome)).await
                else {
                    return summary;
                };
                engine = back;
                record_outcome(result, &mut summary);
            }
            Step::Event(event) => {
                summary.events += 1;
                let Some((back, result)) = off_runtime(engine, move |e| e.on_event(event)).await
                else {
                    return summary;
                };
                engine = back;
                match result {
                    Ok(intents) => {
                        for intent in intents {
                            summary.orders += 1;
                            in_flight += 1;
                            place(intent, &execution, &outcome_tx);
                        }
                    }
                    Err(TickwiseError::MalformedTick { reason }) => {
                        summary.malformed += 1;
                        warn!(strategy = %summary.id, %reason, "dropping malformed tick");
                    }
                    Err(err) => {
                        error!(strategy = %summary.id, error = %err, "event handling failed");
                    }
                }
            }
            Step::Compact => {
                let Some((back, result)) = off_runtime(engine, |e| e.compact()).await else {
                    return summary;
                };
                engine = back;
                match result {
                    Ok(report) if report.total() > 0 => info!(
                        strategy = %summary.id,
                        prices = report.prices,
                        candles = report.candles,
                        bricks = report.bricks,
                        "compacted stored windows"
                    ),
                    Ok(_) => {}
                    Err(err) => warn!(strategy = %summary.id, error = %err, "compaction failed"),
                }
            }
        }
    }

    // settle orders already handed to the executor
    while in_flight > 0 {
        match tokio::time::timeout(SETTLE_TIMEOUT, outcome_rx.recv()).await {
            Ok(Some(outcome)) => {
                in_flight -= 1;
                let Some((back, result)) =
                    off_runtime(engine, move |e| e.on_order_outcome(outcome)).await
                else {
                    return summary;
                };
                engine = back;
                record_outcome(result, &mut summary);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(strategy = %summary.id, in_flight, "gave up waiting for order outcomes");
                break;
            }
        }
    }

    summary.halted = engine.is_halted();
    summary.open_position = engine.position().is_some();
    let Some((_, stats)) = off_runtime(engine, |e| e.trade_stats()).await else {
        return summary;
    };
    match stats {
        Ok(stats) => {
            info!(
                strategy = %summary.id,
                events = summary.events,
                orders = summary.orders,
                trades = stats.total_trades,
                win_rate = stats.win_rate,
                total_pnl_pct = stats.total_pnl_pct,
                "strategy task stopped"
            );
            summary.stats = Some(stats);
        }
        Err(err) => warn!(strategy = %summary.id, error = %err, "could not load trade stats"),
    }
    summary
}

/// Runs engine work on the blocking pool. Engine calls write to the store
/// and sleep between write retries, which must not stall the async workers.
/// A panic in the work is resumed on the calling task. `None` means the
/// runtime is shutting down.
async fn off_runtime<T, F>(engine: StrategyEngine, work: F) -> Option<(StrategyEngine, T)>
where
    F: FnOnce(&mut StrategyEngine) -> T + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let mut engine = engine;
        let out = work(&mut engine);
        (engine, out)
    })
    .await;
    match joined {
        Ok(done) => Some(done),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            error!(error = %err, "engine work cancelled");
            None
        }
    }
}

fn place(
    intent: OrderIntent,
    execution: &Arc<dyn ExecutionPort>,
    outcomes: &mpsc::UnboundedSender<OrderOutcome>,
) {
    let execution = Arc::clone(execution);
    let outcomes = outcomes.clone();
    tokio::spawn(async move {
        let status = execution.place_order(&intent).await;
        let outcome = OrderOutcome {
            order_id: intent.order_id,
            status,
        };
        if outcomes.send(outcome).is_err() {
            debug!(strategy = %intent.strategy_id, order_id = intent.order_id, "outcome arrived after task exit");
        }
    });
}

fn record_outcome(result: Result<(), TickwiseError>, summary: &mut StrategySummary) {
    match result {
        Ok(()) => {}
        Err(err @ TickwiseError::OrderRejected { .. }) => {
            summary.rejected += 1;
            warn!(strategy = %summary.id, error = %err, "order rejected");
        }
        Err(err) => error!(strategy = %summary.id, error = %err, "order outcome handling failed"),
    }
}
