//! Batch executor — applies statements batch by batch with failure isolation.
//!
//! Per batch: `Pending -> Executing -> {Succeeded | Failed}`. A failed batch
//! is recorded and the next one runs; nothing is retried. In dry-run mode
//! the remote is never called and every batch counts as succeeded.

use crate::batch::{chunk, Batch, DEFAULT_BATCH_SIZE};
use crate::progress::BackfillProgress;
use crate::remote::RemoteExecutor;
use backfill_core::statement::{StatementBuilder, UpsertStatement};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Wall-clock bound per batch used by the reference backfill.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Lifecycle of a single batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Executing,
    Succeeded,
    Failed { reason: String },
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Succeeded | BatchState::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_become(&self, next: &BatchState) -> bool {
        matches!(
            (self, next),
            (BatchState::Pending, BatchState::Executing)
                | (BatchState::Executing, BatchState::Succeeded)
                | (BatchState::Executing, BatchState::Failed { .. })
        )
    }
}

/// Record of one batch; terminal once the executor hands it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub rows: usize,
    pub state: BatchState,
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    fn pending(batch: &Batch<'_>) -> Self {
        Self {
            index: batch.index,
            rows: batch.len(),
            state: BatchState::Pending,
            elapsed_ms: 0,
        }
    }

    /// Move to `next`. Illegal transitions leave the state unchanged.
    pub fn advance(&mut self, next: BatchState) {
        if self.state.can_become(&next) {
            self.state = next;
        } else {
            tracing::warn!(batch = self.index, from = ?self.state, to = ?next, "illegal batch transition");
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == BatchState::Succeeded
    }
}

/// Counters for one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub rows_written: usize,
    pub batches_attempted: usize,
    pub batches_failed: usize,
    pub outcomes: Vec<BatchOutcome>,
}

/// Knobs for batch execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub capacity: NonZeroUsize,
    pub timeout: Duration,
    pub dry_run: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
            dry_run: false,
        }
    }
}

pub struct BatchExecutor<'r> {
    remote: &'r dyn RemoteExecutor,
    builder: StatementBuilder,
    settings: ExecutorSettings,
}

impl<'r> BatchExecutor<'r> {
    pub fn new(
        remote: &'r dyn RemoteExecutor,
        builder: StatementBuilder,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            remote,
            builder,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn remote_name(&self) -> &str {
        self.remote.name()
    }

    /// Apply `statements` in order, one batch at a time.
    pub fn execute(
        &self,
        statements: &[UpsertStatement],
        progress: &dyn BackfillProgress,
    ) -> ExecutionSummary {
        let batches = chunk(statements, self.settings.capacity);
        let total = batches.len();
        let mut summary = ExecutionSummary::default();

        for batch in batches {
            let mut outcome = BatchOutcome::pending(&batch);
            outcome.advance(BatchState::Executing);
            progress.on_batch_start(&outcome, total);

            let started = Instant::now();
            outcome.advance(self.run_batch(&batch));
            outcome.elapsed_ms = started.elapsed().as_millis() as u64;
            progress.on_batch_complete(&outcome, total);

            summary.batches_attempted += 1;
            if outcome.succeeded() {
                summary.rows_written += outcome.rows;
            } else {
                summary.batches_failed += 1;
            }
            summary.outcomes.push(outcome);
        }

        summary
    }

    /// Terminal state for one batch.
    fn run_batch(&self, batch: &Batch<'_>) -> BatchState {
        if self.settings.dry_run {
            tracing::debug!(batch = batch.index, rows = batch.len(), "dry run, skipping remote");
            BatchState::Succeeded
        } else {
            let script = self.builder.render_script(batch.statements);
            match self.remote.execute(&script, self.settings.timeout) {
                Ok(()) => BatchState::Succeeded,
                Err(e) => {
                    tracing::warn!(
                        batch = batch.index,
                        rows = batch.len(),
                        remote = self.remote.name(),
                        "batch failed: {e}"
                    );
                    BatchState::Failed { reason: e.short() }
                }
            }
        }
    }
}
