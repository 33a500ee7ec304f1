//! Progress callbacks for a backfill run.
//!
//! The pipeline reports through [`BackfillProgress`]; the binary plugs in
//! [`StdoutProgress`] for human-readable output, tests use [`NoProgress`]
//! or their own recorder.

use crate::executor::{BatchOutcome, BatchState};
use crate::pipeline::{RunSummary, SkipReason};
use backfill_core::domain::SourceFile;
use std::io::Write;

/// Observer for file and batch lifecycle events. Every method defaults to a no-op.
pub trait BackfillProgress: Send {
    /// A resolved file parsed into `candles` rows and is about to be written.
    fn on_file_start(&self, _file: &SourceFile, _candles: usize) {}

    fn on_file_skipped(&self, _file_name: &str, _reason: &SkipReason) {}

    /// The file could not be parsed; nothing from it was written.
    fn on_file_failed(&self, _file_name: &str, _error: &str) {}

    /// The batch (zero-based `index` of `total`) has entered `Executing`.
    fn on_batch_start(&self, _batch: &BatchOutcome, _total: usize) {}

    fn on_batch_complete(&self, _outcome: &BatchOutcome, _total: usize) {}

    fn on_run_complete(&self, _summary: &RunSummary) {}
}

/// Discards every event.
pub struct NoProgress;

impl BackfillProgress for NoProgress {}

/// Prints progress lines to stdout.
pub struct StdoutProgress;

impl BackfillProgress for StdoutProgress {
    fn on_file_start(&self, file: &SourceFile, candles: usize) {
        println!(
            "\n{} tf={}: {candles} candles from {}",
            file.symbol, file.timeframe, file.file_name
        );
    }

    fn on_file_skipped(&self, file_name: &str, reason: &SkipReason) {
        match reason {
            SkipReason::Empty => println!("  SKIP {file_name}: no data rows"),
            SkipReason::Unresolved => println!("  SKIP {file_name}: no matching prefix/timeframe"),
        }
    }

    fn on_file_failed(&self, file_name: &str, error: &str) {
        println!("  ERROR {file_name}: {error}");
    }

    fn on_batch_start(&self, batch: &BatchOutcome, total: usize) {
        print!("  Batch {}/{total} ({} rows)...", batch.index + 1, batch.rows);
        let _ = std::io::stdout().flush();
    }

    fn on_batch_complete(&self, outcome: &BatchOutcome, _total: usize) {
        match &outcome.state {
            BatchState::Failed { reason } => {
                println!(" FAILED");
                println!("    ERROR: {reason}");
            }
            _ => println!(" OK"),
        }
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        println!("\n{}", "=".repeat(50));
        println!(
            "Done! {} rows inserted across {} batches, {} errors",
            summary.rows_written, summary.batches_attempted, summary.batches_failed
        );
        if summary.files_failed > 0 {
            println!("{} file(s) failed to parse", summary.files_failed);
        }
        if summary.dry_run {
            println!("(DRY RUN, no actual writes)");
        }
    }
}
