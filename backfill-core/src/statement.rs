//! Upsert statement builder.
//!
//! Turns parsed candles into idempotent write statements keyed on
//! (ticker, tf, ts). On conflict only `o, h, l, c, updated_at` are
//! overwritten; `v` and the key columns are left as they are.

use crate::domain::{Candle, Timeframe};
use crate::schema::DEFAULT_TABLE;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One insert-or-replace write for a single candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertStatement {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    pub updated_at: i64,
}

impl UpsertStatement {
    /// Render as a single SQLite/D1 statement (no trailing semicolon).
    pub fn to_sql(&self, table: &str) -> String {
        let mut sql = String::with_capacity(320);
        let _ = write!(
            sql,
            "INSERT INTO {table} (ticker, tf, ts, o, h, l, c, v, updated_at) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}) \
             ON CONFLICT(ticker, tf, ts) DO UPDATE SET \
             o=excluded.o, h=excluded.h, l=excluded.l, c=excluded.c, updated_at=excluded.updated_at",
            quote(&self.symbol),
            quote(self.timeframe.code()),
            self.timestamp,
            real(self.open),
            real(self.high),
            real(self.low),
            real(self.close),
            self.volume.map(real).unwrap_or_else(|| "NULL".to_string()),
            self.updated_at,
        );
        sql
    }
}

/// Builds upsert statements for one target table.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    table: String,
}

impl StatementBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// One statement per candle, stamped with the current wall-clock time.
    ///
    /// The clock is read once, so every statement from a call shares the
    /// same `updated_at`.
    pub fn build(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Vec<UpsertStatement> {
        self.build_at(symbol, timeframe, candles, Utc::now().timestamp_millis())
    }

    /// Same as [`build`](Self::build) with an explicit `updated_at`.
    pub fn build_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        updated_at: i64,
    ) -> Vec<UpsertStatement> {
        candles
            .iter()
            .map(|c| UpsertStatement {
                symbol: symbol.to_string(),
                timeframe,
                timestamp: c.timestamp,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
                updated_at,
            })
            .collect()
    }

    pub fn render(&self, statement: &UpsertStatement) -> String {
        statement.to_sql(&self.table)
    }

    /// Join statements into one script, `;`-terminated, one per line.
    pub fn render_script(&self, statements: &[UpsertStatement]) -> String {
        let mut script = String::with_capacity(statements.len() * 320);
        for (i, stmt) in statements.iter().enumerate() {
            if i > 0 {
                script.push('\n');
            }
            script.push_str(&stmt.to_sql(&self.table));
            script.push(';');
        }
        script
    }
}

impl Default for StatementBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE)
    }
}

/// SQL string literal with embedded quotes doubled.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Shortest round-trip decimal form; always a valid SQL numeric literal for
/// finite values.
fn real(v: f64) -> String {
    format!("{v:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle {
            symbol: "RTY1!".into(),
            timeframe: Timeframe::Min5,
            timestamp: ts,
            open: 2000.0,
            high: 2010.5,
            low: 1995.25,
            close,
            volume: None,
        }
    }

    #[test]
    fn one_statement_per_candle_in_order() {
        let candles = vec![candle(3, 1.0), candle(1, 2.0), candle(2, 3.0)];
        let stmts = StatementBuilder::default().build("RTY1!", Timeframe::Min5, &candles);

        assert_eq!(stmts.len(), 3);
        let ts: Vec<i64> = stmts.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![3, 1, 2]);
    }

    #[test]
    fn build_call_shares_one_updated_at() {
        let candles: Vec<Candle> = (0..50).map(|i| candle(i, 1.0)).collect();
        let stmts = StatementBuilder::default().build("RTY1!", Timeframe::Min5, &candles);
        assert!(stmts.iter().all(|s| s.updated_at == stmts[0].updated_at));
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(StatementBuilder::default()
            .build("RTY1!", Timeframe::Min5, &[])
            .is_empty());
    }

    #[test]
    fn sql_matches_store_contract() {
        let stmt = StatementBuilder::default().build_at(
            "RTY1!",
            Timeframe::Min5,
            &[candle(1_704_067_200_000, 2001.0)],
            1_700_000_000_123,
        );
        let sql = stmt[0].to_sql("ticker_candles");
        assert_eq!(
            sql,
            "INSERT INTO ticker_candles (ticker, tf, ts, o, h, l, c, v, updated_at) \
             VALUES ('RTY1!', '5', 1704067200000, 2000.0, 2010.5, 1995.25, 2001.0, NULL, 1700000000123) \
             ON CONFLICT(ticker, tf, ts) DO UPDATE SET \
             o=excluded.o, h=excluded.h, l=excluded.l, c=excluded.c, updated_at=excluded.updated_at"
        );
    }

    #[test]
    fn conflict_clause_never_touches_volume_or_key() {
        let stmt = &StatementBuilder::default().build_at("X", Timeframe::Day, &[candle(1, 1.0)], 0)[0];
        let sql = stmt.to_sql("t");
        let update = sql.split("DO UPDATE SET").nth(1).unwrap();
        for col in ["v=", "ticker=", "tf=", "ts="] {
            assert!(!update.contains(col), "update clause touches {col}");
        }
    }

    #[test]
    fn volume_renders_when_present() {
        let mut c = candle(1, 1.0);
        c.volume = Some(1500.0);
        let stmt = &StatementBuilder::default().build_at("X", Timeframe::Day, &[c], 0)[0];
        assert!(stmt.to_sql("t").contains(", 1500.0, 0)"));
    }

    #[test]
    fn quotes_are_escaped() {
        let stmt = &StatementBuilder::default().build_at("O'NEIL", Timeframe::Day, &[candle(1, 1.0)], 0)[0];
        assert!(stmt.to_sql("t").contains("VALUES ('O''NEIL', 'D'"));
    }

    #[test]
    fn script_is_semicolon_terminated_per_line() {
        let b = StatementBuilder::new("t");
        let stmts = b.build_at("X", Timeframe::Day, &[candle(1, 1.0), candle(2, 1.0)], 0);
        let script = b.render_script(&stmts);
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.ends_with(';')));
    }
}
