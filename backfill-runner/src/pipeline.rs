//! Pipeline driver — resolve, parse, build, execute, one file at a time.
//!
//! Files run sequentially in filename order and batches run sequentially
//! within a file. Error handling per stage:
//!
//! - unresolved filename: skipped, noted
//! - parse error: that file is abandoned, nothing from it is written
//! - empty file: skipped
//! - batch failure or timeout: counted, the next batch runs
//! - missing input directory: fatal before anything runs

use crate::config::{BackfillConfig, ConfigError};
use crate::executor::{BatchExecutor, BatchOutcome, ExecutorSettings};
use crate::progress::BackfillProgress;
use crate::remote::RemoteExecutor;
use backfill_core::domain::{content_hash, time_span, SourceFile};
use backfill_core::parser::parse_file;
use backfill_core::resolver::{Resolution, SourceResolver};
use backfill_core::statement::StatementBuilder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal errors. Everything else is recorded in the report and the run goes on.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot resolve symbol/timeframe for '{0}'")]
    Unresolved(String),
}

/// Why a file produced no writes without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No prefix/timeframe mapping for the filename.
    Unresolved,
    /// Header only, no data rows.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Loaded {
        candles: usize,
        rows_written: usize,
        batches: usize,
        batches_failed: usize,
        first_ts: i64,
        last_ts: i64,
        content_hash: String,
        /// Failed batches only.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failures: Vec<BatchOutcome>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

/// Result of processing one export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileReport {
    fn unresolved(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            symbol: None,
            timeframe: None,
            outcome: FileOutcome::Skipped {
                reason: SkipReason::Unresolved,
            },
        }
    }

    fn for_source(source: &SourceFile, outcome: FileOutcome) -> Self {
        Self {
            file_name: source.file_name.clone(),
            symbol: Some(source.symbol.clone()),
            timeframe: Some(source.timeframe.code().to_string()),
            outcome,
        }
    }

    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            FileOutcome::Failed { .. } => true,
            FileOutcome::Loaded { batches_failed, .. } => *batches_failed > 0,
            FileOutcome::Skipped { .. } => false,
        }
    }
}

/// Running counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_written: usize,
    pub batches_attempted: usize,
    pub batches_failed: usize,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn record(&mut self, report: &FileReport) {
        self.files_total += 1;
        match &report.outcome {
            FileOutcome::Loaded {
                rows_written,
                batches,
                batches_failed,
                ..
            } => {
                self.files_loaded += 1;
                self.rows_written += rows_written;
                self.batches_attempted += batches;
                self.batches_failed += batches_failed;
            }
            FileOutcome::Skipped { .. } => self.files_skipped += 1,
            FileOutcome::Failed { .. } => self.files_failed += 1,
        }
    }

    /// True when any file failed to parse or any batch failed to apply.
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0 || self.batches_failed > 0
    }
}

/// Everything a run did, in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub target: String,
    /// Fingerprint of the configuration the run used, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub files: Vec<FileReport>,
}

/// Sequential driver over one resolver, one builder and one remote.
pub struct Pipeline<'r> {
    resolver: SourceResolver,
    builder: StatementBuilder,
    executor: BatchExecutor<'r>,
}

impl<'r> Pipeline<'r> {
    pub fn new(
        resolver: SourceResolver,
        builder: StatementBuilder,
        remote: &'r dyn RemoteExecutor,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            executor: BatchExecutor::new(remote, builder.clone(), settings),
            resolver,
            builder,
        }
    }

    /// Pipeline wired from a validated configuration.
    pub fn from_config(
        config: &BackfillConfig,
        remote: &'r dyn RemoteExecutor,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.resolver()?,
            config.statement_builder(),
            remote,
            config.settings()?,
        ))
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    fn dry_run(&self) -> bool {
        self.executor.settings().dry_run
    }

    /// Backfill every `.csv` file in `dir`.
    pub fn run_dir(
        &self,
        dir: &Path,
        progress: &dyn BackfillProgress,
    ) -> Result<RunReport, BackfillError> {
        if !dir.is_dir() {
            return Err(ConfigError::InputDirMissing(dir.to_path_buf()).into());
        }

        let started_at = Utc::now();
        let resolutions = self
            .resolver
            .scan_dir(dir)
            .map_err(|source| BackfillError::Scan {
                path: dir.to_path_buf(),
                source,
            })?;

        let matched = resolutions
            .iter()
            .filter(|r| matches!(r, Resolution::Matched(_)))
            .count();
        tracing::info!(
            dir = %dir.display(),
            files = resolutions.len(),
            matched,
            dry_run = self.dry_run(),
            "starting backfill"
        );
        if matched == 0 {
            tracing::info!("no matching CSV files found to backfill");
        }

        let mut summary = RunSummary {
            dry_run: self.dry_run(),
            ..Default::default()
        };
        let mut files = Vec::with_capacity(resolutions.len());

        for resolution in &resolutions {
            let report = match resolution {
                Resolution::Matched(source) => self.run_file(source, progress),
                Resolution::Unmatched { file_name } => {
                    tracing::info!(file = %file_name, "skipping unresolved file");
                    progress.on_file_skipped(file_name, &SkipReason::Unresolved);
                    FileReport::unresolved(file_name)
                }
            };
            summary.record(&report);
            files.push(report);
        }

        progress.on_run_complete(&summary);
        tracing::info!(
            rows = summary.rows_written,
            batches = summary.batches_attempted,
            failed = summary.batches_failed,
            files_failed = summary.files_failed,
            "backfill finished"
        );

        Ok(RunReport {
            schema_version: crate::report::SCHEMA_VERSION,
            target: self.executor.remote_name().to_string(),
            config_id: None,
            started_at,
            finished_at: Utc::now(),
            summary,
            files,
        })
    }

    /// Backfill a single path, resolving symbol and timeframe from its name.
    pub fn run_path(
        &self,
        path: &Path,
        progress: &dyn BackfillProgress,
    ) -> Result<FileReport, BackfillError> {
        let source = self.resolver.resolve(path).ok_or_else(|| {
            BackfillError::Unresolved(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })?;
        Ok(self.run_file(&source, progress))
    }

    /// Parse, build and execute one resolved file.
    pub fn run_file(&self, source: &SourceFile, progress: &dyn BackfillProgress) -> FileReport {
        let candles = match parse_file(source) {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(file = %source.file_name, "parse failed: {e}");
                let error = e.kind.to_string();
                progress.on_file_failed(&source.file_name, &error);
                return FileReport::for_source(source, FileOutcome::Failed { error });
            }
        };

        let Some((first_ts, last_ts)) = time_span(&candles) else {
            tracing::info!(file = %source.file_name, "no data rows");
            progress.on_file_skipped(&source.file_name, &SkipReason::Empty);
            return FileReport::for_source(
                source,
                FileOutcome::Skipped {
                    reason: SkipReason::Empty,
                },
            );
        };

        progress.on_file_start(source, candles.len());
        let statements = self
            .builder
            .build(&source.symbol, source.timeframe, &candles);
        let executed = self.executor.execute(&statements, progress);

        tracing::info!(
            file = %source.file_name,
            symbol = %source.symbol,
            tf = %source.timeframe,
            candles = candles.len(),
            rows = executed.rows_written,
            failed = executed.batches_failed,
            "file done"
        );

        FileReport::for_source(
            source,
            FileOutcome::Loaded {
                candles: candles.len(),
                rows_written: executed.rows_written,
                batches: executed.batches_attempted,
                batches_failed: executed.batches_failed,
                first_ts,
                last_ts,
                content_hash: content_hash(&candles),
                failures: executed
                    .outcomes
                    .into_iter()
                    .filter(|o| !o.succeeded())
                    .collect(),
            },
        )
    }

    /// Single-file run wrapped as a full report.
    pub fn report_for(&self, report: FileReport, started_at: DateTime<Utc>) -> RunReport {
        let mut summary = RunSummary {
            dry_run: self.dry_run(),
            ..Default::default()
        };
        summary.record(&report);
        RunReport {
            schema_version: crate::report::SCHEMA_VERSION,
            target: self.executor.remote_name().to_string(),
            config_id: None,
            started_at,
            finished_at: Utc::now(),
            summary,
            files: vec![report],
        }
    }
}
