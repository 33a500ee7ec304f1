use super::timeframe::Timeframe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity of one export file, derived once by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub path: PathBuf,
    pub file_name: String,
}

impl SourceFile {
    /// Descriptor for a file whose symbol and timeframe were given explicitly.
    pub fn with_override(path: &Path, symbol: &str, timeframe: Timeframe) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            symbol: symbol.to_string(),
            timeframe,
            path: path.to_path_buf(),
            file_name,
        }
    }
}
