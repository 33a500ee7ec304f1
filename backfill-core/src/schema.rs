//! Store schema contract.
//!
//! The primary key on (ticker, tf, ts) is what makes the upsert idempotent;
//! without it every run appends duplicates.

/// Default candle table name.
pub const DEFAULT_TABLE: &str = "ticker_candles";

/// Column layout of the candle table, in insert order.
pub const COLUMNS: &[(&str, &str)] = &[
    ("ticker", "TEXT NOT NULL"),
    ("tf", "TEXT NOT NULL"),
    ("ts", "INTEGER NOT NULL"),
    ("o", "REAL"),
    ("h", "REAL"),
    ("l", "REAL"),
    ("c", "REAL"),
    ("v", "REAL"),
    ("updated_at", "INTEGER"),
];

/// Identity columns.
pub const KEY_COLUMNS: &[&str] = &["ticker", "tf", "ts"];

/// `CREATE TABLE IF NOT EXISTS` for the candle table.
pub fn create_table_sql(table: &str) -> String {
    let cols: Vec<String> = COLUMNS
        .iter()
        .map(|(name, ty)| format!("  {name} {ty}"))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{},\n  PRIMARY KEY ({})\n)",
        cols.join(",\n"),
        KEY_COLUMNS.join(", ")
    )
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
