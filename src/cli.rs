//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info, warn};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_execution::PaperExecution;
use crate::adapters::sqlite_store::SqliteStore;
use crate::adapters::tick_source::TickReader;
use crate::adapters::tracing_events::TracingEventSink;
use crate::domain::config_validation::validate_storage_config;
use crate::domain::engine::StrategyEngine;
use crate::domain::error::TickwiseError;
use crate::domain::metrics::TradeStats;
use crate::domain::position::Trade;
use crate::domain::settings::{EngineSettings, StrategySettings, load_enabled_strategies};
use crate::domain::strategy::build_rule;
use crate::orchestrator::{Orchestrator, StrategySummary, pump};
use crate::ports::event_port::EventSink;
use crate::ports::execution_port::ExecutionPort;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "tickwise", about = "Live tick-stream multi-strategy engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every enabled strategy against a JSON-lines price feed
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Feed file; reads stdin when omitted
        #[arg(short, long)]
        ticks: Option<PathBuf>,
    },
    /// Validate the configuration without touching the store
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print closed-trade statistics
    Stats {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Trim stored windows to their configured caps
    Compact {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub async fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config, ticks } => run_engine(&config, ticks.as_deref()).await,
        Command::Validate { config } => run_validate(&config),
        Command::Stats { config, strategy } => run_stats(&config, strategy.as_deref()),
        Command::Compact { config } => run_compact(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Validated store with its schema in place.
pub fn open_store(config: &FileConfigAdapter) -> Result<Arc<SqliteStore>, TickwiseError> {
    validate_storage_config(config)?;
    let store = SqliteStore::from_config(config)?;
    store.initialize_schema()?;
    Ok(Arc::new(store))
}

/// Recovers every strategy from the store. A strategy whose stored state
/// does not check out is logged and left out; the rest still run.
pub fn recover_strategies(
    strategies: Vec<StrategySettings>,
    engine: &EngineSettings,
    store: Arc<dyn StorePort>,
    sink: Arc<dyn EventSink>,
) -> Vec<StrategyEngine> {
    let mut engines = Vec::with_capacity(strategies.len());
    for settings in strategies {
        let id = settings.id.clone();
        let rule = build_rule(&settings);
        match StrategyEngine::recover(settings, engine, rule, Arc::clone(&store), Arc::clone(&sink)) {
            Ok(recovered) => engines.push(recovered),
            Err(err) => error!(strategy = %id, error = %err, "strategy blocked at startup"),
        }
    }
    engines
}

async fn run_engine(config_path: &Path, ticks: Option<&Path>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match serve(&config, ticks).await {
        Ok(summaries) => {
            for s in &summaries {
                info!(
                    strategy = %s.id,
                    events = s.events,
                    lagged = s.lagged,
                    malformed = s.malformed,
                    orders = s.orders,
                    rejected = s.rejected,
                    halted = s.halted,
                    open_position = s.open_position,
                    "strategy summary"
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

async fn serve(
    config: &FileConfigAdapter,
    ticks: Option<&Path>,
) -> Result<Vec<StrategySummary>, TickwiseError> {
    let engine_settings = EngineSettings::from_config(config);
    let strategies = load_enabled_strategies(config)?;
    let store = open_store(config)?;

    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let engines = recover_strategies(strategies, &engine_settings, store, sink);
    if engines.is_empty() {
        return Err(TickwiseError::NoStrategies);
    }

    let feed: Box<dyn AsyncBufRead + Unpin + Send> = match ticks {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let execution: Arc<dyn ExecutionPort> = Arc::new(PaperExecution::from_config(config));
    let compaction_every = Duration::from_secs(engine_settings.compaction_interval_secs);
    let mut orchestrator = Orchestrator::new(engine_settings.feed_capacity);
    for engine in engines {
        orchestrator.spawn(engine, Arc::clone(&execution), compaction_every);
    }
    info!(strategies = orchestrator.strategy_count(), "engine running");

    let fed = feed_until_shutdown(feed, &orchestrator).await;
    if let Err(e) = &fed {
        warn!(error = %e, "feed stopped early");
    }

    let summaries = orchestrator.join().await;
    fed.map(|_| summaries)
}

/// Pumps the feed until it ends or a SIGINT/SIGTERM arrives.
async fn feed_until_shutdown<R: AsyncBufRead + Unpin>(
    reader: R,
    orchestrator: &Orchestrator,
) -> Result<(), TickwiseError> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    };
    tokio::pin!(shutdown);

    tokio::select! {
        fed = pump(TickReader::new(reader), orchestrator.publisher()) => fed.map(|_| ()),
        _ = &mut shutdown => {
            orchestrator.shutdown();
            Ok(())
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_storage_config(&config) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let strategies = match load_enabled_strategies(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if strategies.is_empty() {
        let e = TickwiseError::NoStrategies;
        eprintln!("error: {e}");
        return (&e).into();
    }

    let engine = EngineSettings::from_config(&config);
    eprintln!(
        "\nEngine: feed_capacity={} compaction={}s recent_trades={} persist_retries={}",
        engine.feed_capacity,
        engine.compaction_interval_secs,
        engine.recent_trades,
        engine.persist_retries
    );
    for s in &strategies {
        eprintln!(
            "  [{}] base_size={} min_strength={} stop={}bps target={}bps max_hold={}s",
            s.id,
            s.base_size,
            s.min_strength,
            s.exits.stop_loss_bps,
            s.exits.take_profit_bps,
            s.exits.max_hold_ms / 1000
        );
    }
    eprintln!("\nConfiguration is valid ({} strategies).", strategies.len());
    ExitCode::SUCCESS
}

fn run_stats(config_path: &Path, strategy: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let ids = match strategy {
        Some(id) => vec![id.to_string()],
        None => match store.strategies_with_trades() {
            Ok(ids) => ids,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
    };
    if ids.is_empty() {
        println!("No closed trades recorded.");
        return ExitCode::SUCCESS;
    }

    for id in &ids {
        let trades = match store.load_trades(id, usize::MAX) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };
        println!("{}", format_stats(id, &trades));
        match store.load_position(id) {
            Ok(Some(p)) => println!(
                "  open position: {} {} @ {:.4} (stop {:.4}, target {:.4}) since {}",
                p.side,
                p.size,
                p.entry_price,
                p.stop_loss,
                p.take_profit,
                format_time(p.opened_at)
            ),
            Ok(None) => {}
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    ExitCode::SUCCESS
}

/// Human-readable report for one strategy's trade history.
pub fn format_stats(strategy: &str, trades: &[Trade]) -> String {
    let stats = TradeStats::compute(trades);
    let mut out = format!("[{strategy}] {} trades", stats.total_trades);
    if let (Some(first), Some(last)) = (trades.first(), trades.last()) {
        out.push_str(&format!(
            " from {} to {}",
            format_time(first.opened_at),
            format_time(last.closed_at)
        ));
    }
    if stats.total_trades == 0 {
        return out;
    }
    out.push_str(&format!(
        "\n  won {} / lost {} / even {}  win rate {:.1}%  profit factor {:.2}",
        stats.trades_won,
        stats.trades_lost,
        stats.trades_breakeven,
        stats.win_rate * 100.0,
        stats.profit_factor
    ));
    out.push_str(&format!(
        "\n  pnl total {:.3}%  avg {:.3}%  avg win {:.3}%  avg loss {:.3}%  best {:.3}%  worst {:.3}%",
        stats.total_pnl_pct,
        stats.avg_pnl_pct,
        stats.avg_win_pct,
        stats.avg_loss_pct,
        stats.largest_win_pct,
        stats.largest_loss_pct
    ));
    out.push_str(&format!(
        "\n  avg hold {:.0}s  exits: stop {} target {} reversal {} max-hold {}",
        stats.avg_hold_secs,
        stats.stop_losses,
        stats.take_profits,
        stats.reversals,
        stats.max_holds
    ));
    out
}

fn format_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn run_compact(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let strategies = match load_enabled_strategies(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    for s in &strategies {
        match store.compact(&s.id, &s.caps) {
            Ok(report) => println!(
                "[{}] removed {} prices, {} candles, {} bricks",
                s.id, report.prices, report.candles, report.bricks
            ),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    ExitCode::SUCCESS
}
