//! Remote execution capability.
//!
//! A `RemoteExecutor` takes one serialized batch (a `;`-terminated SQL
//! script) and applies it to durable storage within a timeout. The executor
//! never retries; the batch layer above records the failure and moves on.

pub mod d1_http;
pub mod dry_run;
pub mod sqlite;
pub mod wrangler;

pub use d1_http::D1HttpExecutor;
pub use dry_run::DryRunExecutor;
pub use sqlite::SqliteStore;
pub use wrangler::WranglerExecutor;

use std::time::Duration;
use thiserror::Error;

/// Longest error detail shown in progress output and reports.
pub const DETAIL_LIMIT: usize = 300;

/// Why a batch did not apply.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("remote execution failed: {detail}")]
    Failed { detail: String },

    #[error("timed out after {}s", after.as_secs_f64())]
    TimedOut { after: Duration },

    #[error("could not start executor: {0}")]
    Spawn(String),

    #[error("staging payload: {0}")]
    Staging(String),

    #[error("http request failed: {0}")]
    Http(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl ExecError {
    /// Error text cut to [`DETAIL_LIMIT`] characters.
    pub fn short(&self) -> String {
        truncate_detail(&self.to_string(), DETAIL_LIMIT)
    }
}

/// Applies one serialized batch to a store.
pub trait RemoteExecutor: Send {
    /// Human-readable target description for logs.
    fn name(&self) -> &str;

    /// Execute `script` as a single unit of work, bounded by `timeout`.
    ///
    /// Exceeding the timeout must be reported as [`ExecError::TimedOut`].
    /// Anything staged to perform the call must be gone when this returns.
    fn execute(&self, script: &str, timeout: Duration) -> Result<(), ExecError>;
}

/// Cut `text` to at most `limit` characters on a char boundary.
pub fn truncate_detail(text: &str, limit: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
