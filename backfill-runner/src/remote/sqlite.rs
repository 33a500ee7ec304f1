//! Local SQLite store.
//!
//! D1 speaks SQLite, so the same upsert scripts apply unchanged. Each batch
//! runs in one transaction: it lands completely or not at all. A batch that
//! outlives its timeout is interrupted and rolled back.

use super::{ExecError, RemoteExecutor};
use backfill_core::domain::{StoredCandle, Timeframe};
use backfill_core::schema::create_table_sql;
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    label: String,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the candle table exists.
    pub fn open(path: &Path, table: &str) -> Result<Self, ExecError> {
        let conn = Connection::open(path)?;
        Self::init(conn, table, format!("sqlite {}", path.display()))
    }

    pub fn in_memory(table: &str) -> Result<Self, ExecError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, table, "sqlite :memory:".to_string())
    }

    fn init(conn: Connection, table: &str, label: String) -> Result<Self, ExecError> {
        conn.execute_batch(&create_table_sql(table))?;
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            label,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ExecError> {
        self.conn.lock().map_err(|_| ExecError::Failed {
            detail: "sqlite connection lock poisoned".into(),
        })
    }

    /// Stored rows for one (symbol, timeframe), ascending by timestamp.
    pub fn fetch(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<StoredCandle>, ExecError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT ticker, tf, ts, o, h, l, c, v, updated_at
             FROM {}
             WHERE ticker = ?1 AND tf = ?2
             ORDER BY ts",
            self.table
        ))?;

        let rows = stmt
            .query_map(params![symbol, timeframe.code()], |row| {
                Ok(StoredCandle {
                    symbol: row.get(0)?,
                    timeframe: row.get(1)?,
                    timestamp: row.get(2)?,
                    open: row.get(3)?,
                    high: row.get(4)?,
                    low: row.get(5)?,
                    close: row.get(6)?,
                    volume: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total rows in the candle table.
    pub fn row_count(&self) -> Result<usize, ExecError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| {
            r.get(0)
        })?;
        Ok(n as usize)
    }

    /// Run arbitrary SQL outside the batch path (fixtures, manual fixes).
    pub fn execute_sql(&self, sql: &str) -> Result<(), ExecError> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }
}

impl RemoteExecutor for SqliteStore {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute(&self, script: &str, timeout: Duration) -> Result<(), ExecError> {
        let mut conn = self.lock()?;
        conn.busy_timeout(timeout)?;
        let tx = conn.transaction()?;

        let deadline = Instant::now() + timeout;
        tx.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        let applied = tx.execute_batch(script);
        tx.progress_handler(0, None::<fn() -> bool>);

        match applied {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                // An interrupt may already have rolled the transaction back.
                if let Err(rb) = tx.rollback() {
                    tracing::debug!("rollback after failed batch: {rb}");
                }
                Err(interrupted_as_timeout(e, timeout))
            }
        }
    }
}

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

fn interrupted_as_timeout(err: rusqlite::Error, timeout: Duration) -> ExecError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            ExecError::TimedOut { after: timeout }
        }
        other => ExecError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn schema_is_created_on_open() {
        let store = SqliteStore::in_memory("ticker_candles").unwrap();
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn failing_statement_rolls_back_whole_batch() {
        let store = SqliteStore::in_memory("ticker_candles").unwrap();
        let script = "INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
                      VALUES ('A', 'D', 1, 1.0, 1.0, 1.0, 1.0, NULL, 0);\n\
                      INSERT INTO missing_table VALUES (1);";

        let err = store.execute(script, TIMEOUT).unwrap_err();
        assert!(matches!(err, ExecError::Store(_)));
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn runaway_batch_times_out_and_rolls_back() {
        let store = SqliteStore::in_memory("ticker_candles").unwrap();
        let script = "INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
                      VALUES ('A', 'D', 1, 1.0, 1.0, 1.0, 1.0, NULL, 0);\n\
                      WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                      INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
                      SELECT 'B', 'D', x, 1.0, 1.0, 1.0, 1.0, NULL, 0 FROM n WHERE x < 0;";

        let started = Instant::now();
        let err = store
            .execute(script, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(store.row_count().unwrap(), 0);

        store
            .execute(
                "INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
                 VALUES ('A', 'D', 1, 1.0, 1.0, 1.0, 1.0, NULL, 0);",
                TIMEOUT,
            )
            .unwrap();
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.db");
        {
            let store = SqliteStore::open(&path, "ticker_candles").unwrap();
            store
                .execute(
                    "INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
                     VALUES ('A', 'D', 1, 1.0, 2.0, 0.5, 1.5, NULL, 10);",
                    TIMEOUT,
                )
                .unwrap();
        }
        let store = SqliteStore::open(&path, "ticker_candles").unwrap();
        let rows = store.fetch("A", Timeframe::Day).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].high, 2.0);
        assert_eq!(rows[0].volume, None);
        assert_eq!(rows[0].updated_at, 10);
    }
}
