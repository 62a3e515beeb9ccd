//! SQLite persistence store.
//!
//! Rows are plain columns so external reporting tools can read them
//! directly; the schema only ever grows. File-backed databases run in WAL
//! mode with `synchronous = NORMAL`, which commits each transaction fully or
//! not at all across a crash. Windows are append-only and ordered by rowid;
//! [`StorePort::compact`] trims them back to their caps.

use crate::domain::brick::{Brick, Direction};
use crate::domain::candle::Candle;
use crate::domain::error::TickwiseError;
use crate::domain::position::{ExitReason, Position, ScaledEntry, Side, Trade};
use crate::domain::settings::RetentionCaps;
use crate::domain::tick::Tick;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{CompactionReport, Namespace, StorePort};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS positions (
    strategy TEXT PRIMARY KEY,
    side TEXT NOT NULL,
    entry_price REAL NOT NULL,
    size REAL NOT NULL,
    stop_loss REAL NOT NULL,
    take_profit REAL NOT NULL,
    opened_at INTEGER NOT NULL,
    reference REAL,
    scaled_entries TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS bricks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy TEXT NOT NULL,
    open_time INTEGER NOT NULL,
    open REAL NOT NULL,
    close REAL NOT NULL,
    direction TEXT NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bricks_strategy ON bricks(strategy, id);
CREATE TABLE IF NOT EXISTS candles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy TEXT NOT NULL,
    open_time INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL DEFAULT 0,
    UNIQUE (strategy, open_time)
);
CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    price REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_price_history_strategy ON price_history(strategy, id);
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy TEXT NOT NULL,
    side TEXT NOT NULL,
    entry_price REAL NOT NULL,
    exit_price REAL NOT NULL,
    size REAL NOT NULL,
    pnl_pct REAL NOT NULL,
    opened_at INTEGER NOT NULL,
    closed_at INTEGER NOT NULL,
    exit_reason TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trades_strategy ON trades(strategy, id);";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TickwiseError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TickwiseError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.busy_timeout(Duration::from_secs(5))
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TickwiseError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), TickwiseError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_error)?;
        Ok(())
    }

    /// Distinct strategy ids with at least one recorded trade.
    pub fn strategies_with_trades(&self) -> Result<Vec<String>, TickwiseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT strategy FROM trades ORDER BY strategy")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;
        collect(rows)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TickwiseError> {
        self.pool.get().map_err(pool_error)
    }

    fn trim(
        tx: &rusqlite::Transaction<'_>,
        table: &str,
        strategy: &str,
        cap: usize,
    ) -> Result<usize, TickwiseError> {
        let sql = format!(
            "DELETE FROM {table} WHERE strategy = ?1 AND id NOT IN (
                 SELECT id FROM {table} WHERE strategy = ?1 ORDER BY id DESC LIMIT ?2
             )"
        );
        tx.execute(&sql, params![strategy, sql_limit(cap)])
            .map_err(query_error)
    }
}

impl StorePort for SqliteStore {
    fn save_position(&self, position: &Position) -> Result<(), TickwiseError> {
        let scaled = serde_json::to_string(&position.scaled_entries).map_err(|e| {
            TickwiseError::DatabaseQuery {
                reason: e.to_string(),
            }
        })?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO positions
                 (strategy, side, entry_price, size, stop_loss, take_profit, opened_at, reference, scaled_entries)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(strategy) DO UPDATE SET
                 side = excluded.side,
                 entry_price = excluded.entry_price,
                 size = excluded.size,
                 stop_loss = excluded.stop_loss,
                 take_profit = excluded.take_profit,
                 opened_at = excluded.opened_at,
                 reference = excluded.reference,
                 scaled_entries = excluded.scaled_entries",
            params![
                position.strategy_id,
                position.side.as_str(),
                position.entry_price,
                position.size,
                position.stop_loss,
                position.take_profit,
                position.opened_at,
                position.reference,
                scaled
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn load_position(&self, strategy: &str) -> Result<Option<Position>, TickwiseError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT strategy, side, entry_price, size, stop_loss, take_profit, opened_at, reference, scaled_entries
             FROM positions WHERE strategy = ?1",
            params![strategy],
            |row| {
                let side: String = row.get(1)?;
                let scaled: String = row.get(8)?;
                let scaled_entries: Vec<ScaledEntry> =
                    serde_json::from_str(&scaled).map_err(|e| conversion_error(8, e))?;
                Ok(Position {
                    strategy_id: row.get(0)?,
                    side: parse_side(1, &side)?,
                    entry_price: row.get(2)?,
                    size: row.get(3)?,
                    stop_loss: row.get(4)?,
                    take_profit: row.get(5)?,
                    opened_at: row.get(6)?,
                    reference: row.get(7)?,
                    scaled_entries,
                })
            },
        )
        .optional()
        .map_err(query_error)
    }

    fn clear_position(&self, strategy: &str) -> Result<(), TickwiseError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM positions WHERE strategy = ?1", params![strategy])
            .map_err(query_error)?;
        Ok(())
    }

    fn close_position(&self, trade: &Trade) -> Result<(), TickwiseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        tx.execute(
            "INSERT INTO trades
                 (strategy, side, entry_price, exit_price, size, pnl_pct, opened_at, closed_at, exit_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trade.strategy_id,
                trade.side.as_str(),
                trade.entry_price,
                trade.exit_price,
                trade.size,
                trade.pnl_pct,
                trade.opened_at,
                trade.closed_at,
                trade.exit_reason.as_str()
            ],
        )
        .map_err(query_error)?;
        tx.execute(
            "DELETE FROM positions WHERE strategy = ?1",
            params![trade.strategy_id],
        )
        .map_err(query_error)?;
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn append_bricks(&self, strategy: &str, bricks: &[Brick]) -> Result<(), TickwiseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for brick in bricks {
            tx.execute(
                "INSERT INTO bricks (strategy, open_time, open, close, direction, high, low)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    strategy,
                    brick.open_time,
                    brick.open,
                    brick.close,
                    brick.direction.as_str(),
                    brick.high,
                    brick.low
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn load_bricks(&self, strategy: &str, limit: usize) -> Result<Vec<Brick>, TickwiseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT open_time, open, close, direction, high, low FROM (
                     SELECT * FROM bricks WHERE strategy = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![strategy, sql_limit(limit)], |row| {
                let direction: String = row.get(3)?;
                let direction = Direction::parse(&direction).ok_or_else(|| {
                    conversion_error(3, format!("unknown direction '{direction}'"))
                })?;
                Ok(Brick {
                    open_time: row.get(0)?,
                    open: row.get(1)?,
                    close: row.get(2)?,
                    direction,
                    high: row.get(4)?,
                    low: row.get(5)?,
                })
            })
            .map_err(query_error)?;
        collect(rows)
    }

    fn append_candle(&self, strategy: &str, candle: &Candle) -> Result<(), TickwiseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO candles (strategy, open_time, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(strategy, open_time) DO NOTHING",
            params![
                strategy,
                candle.open_time,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn load_candles(&self, strategy: &str, limit: usize) -> Result<Vec<Candle>, TickwiseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT open_time, open, high, low, close, volume FROM (
                     SELECT * FROM candles WHERE strategy = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![strategy, sql_limit(limit)], |row| {
                Ok(Candle {
                    open_time: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(query_error)?;
        collect(rows)
    }

    fn append_price(&self, strategy: &str, tick: &Tick) -> Result<(), TickwiseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO price_history (strategy, timestamp, price) VALUES (?1, ?2, ?3)",
            params![strategy, tick.timestamp, tick.price],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn load_prices(&self, strategy: &str, limit: usize) -> Result<Vec<Tick>, TickwiseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, price FROM (
                     SELECT * FROM price_history WHERE strategy = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![strategy, sql_limit(limit)], |row| {
                Ok(Tick::new(row.get(0)?, row.get(1)?))
            })
            .map_err(query_error)?;
        collect(rows)
    }

    fn load_trades(&self, strategy: &str, limit: usize) -> Result<Vec<Trade>, TickwiseError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT strategy, side, entry_price, exit_price, size, pnl_pct, opened_at, closed_at, exit_reason
                 FROM (
                     SELECT * FROM trades WHERE strategy = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![strategy, sql_limit(limit)], |row| {
                let side: String = row.get(1)?;
                let reason: String = row.get(8)?;
                let exit_reason = ExitReason::parse(&reason)
                    .ok_or_else(|| conversion_error(8, format!("unknown exit reason '{reason}'")))?;
                Ok(Trade {
                    strategy_id: row.get(0)?,
                    side: parse_side(1, &side)?,
                    entry_price: row.get(2)?,
                    exit_price: row.get(3)?,
                    size: row.get(4)?,
                    pnl_pct: row.get(5)?,
                    opened_at: row.get(6)?,
                    closed_at: row.get(7)?,
                    exit_reason,
                })
            })
            .map_err(query_error)?;
        collect(rows)
    }

    fn count(&self, strategy: &str, namespace: Namespace) -> Result<usize, TickwiseError> {
        let table = match namespace {
            Namespace::Position => "positions",
            Namespace::Bricks => "bricks",
            Namespace::Candles => "candles",
            Namespace::PriceHistory => "price_history",
            Namespace::Trades => "trades",
        };
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE strategy = ?1"),
                params![strategy],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        Ok(count as usize)
    }

    fn compact(
        &self,
        strategy: &str,
        caps: &RetentionCaps,
    ) -> Result<CompactionReport, TickwiseError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let report = CompactionReport {
            prices: Self::trim(&tx, "price_history", strategy, caps.prices)?,
            candles: Self::trim(&tx, "candles", strategy, caps.candles)?,
            bricks: Self::trim(&tx, "bricks", strategy, caps.bricks)?,
        };
        tx.commit().map_err(query_error)?;
        Ok(report)
    }
}

fn pool_error(e: r2d2::Error) -> TickwiseError {
    TickwiseError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> TickwiseError {
    TickwiseError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, e.into())
}

fn parse_side(column: usize, value: &str) -> Result<Side, rusqlite::Error> {
    Side::parse(value).ok_or_else(|| conversion_error(column, format!("unknown side '{value}'")))
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

fn collect<T>(
    rows: impl Iterator<Item = Result<T, rusqlite::Error>>,
) -> Result<Vec<T>, TickwiseError> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(query_error)?);
    }
    Ok(out)
}
