//! Run report persistence.
//!
//! Reports are pretty JSON carrying a `schema_version`; newer versions are
//! rejected on load.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::BackfillConfig;
use crate::pipeline::RunReport;

/// Current schema version for persisted run reports.
pub const SCHEMA_VERSION: u32 = 1;

pub fn export_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize RunReport to JSON")
}

pub fn import_json(json: &str) -> Result<RunReport> {
    let report: RunReport =
        serde_json::from_str(json).context("failed to deserialize RunReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

/// Write `report` to `path`, creating parent directories.
pub fn save_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, export_json(report)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "run report written");
    Ok(())
}

pub fn load_report(path: &Path) -> Result<RunReport> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Content-addressed id of a configuration; equal configs share an id.
pub fn config_id(config: &BackfillConfig) -> Result<String> {
    let json = serde_json::to_string(config).context("failed to serialize BackfillConfig")?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}
