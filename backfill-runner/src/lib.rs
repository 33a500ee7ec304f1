//! Backfill Runner — batch execution against a store, configuration, run driver.
//!
//! This crate builds on `backfill-core` to provide:
//! - Chunking of upsert statements into bounded batches
//! - The batch executor with per-batch failure isolation and dry run
//! - Remote executors: wrangler subprocess, D1 HTTP API, local SQLite, dry run
//! - TOML run configuration with validation
//! - The sequential pipeline driver, progress callbacks and JSON run reports

pub mod batch;
pub mod config;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod remote;
pub mod report;

pub use batch::{batch_count, chunk, Batch, DEFAULT_BATCH_SIZE};
pub use config::{BackfillConfig, ConfigError, Credentials, Target};
pub use executor::{
    BatchExecutor, BatchOutcome, BatchState, ExecutionSummary, ExecutorSettings, DEFAULT_TIMEOUT,
};
pub use pipeline::{
    BackfillError, FileOutcome, FileReport, Pipeline, RunReport, RunSummary, SkipReason,
};
pub use progress::{BackfillProgress, NoProgress, StdoutProgress};
pub use remote::{
    D1HttpExecutor, DryRunExecutor, ExecError, RemoteExecutor, SqliteStore, WranglerExecutor, DETAIL_LIMIT,
};
pub use report::{config_id, load_report, save_report};
