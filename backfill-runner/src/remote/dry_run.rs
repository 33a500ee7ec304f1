//! Stand-in executor for dry runs. It accepts every batch and opens no
//! file, process or connection, so a dry run needs neither credentials nor
//! a reachable target.

use super::{ExecError, RemoteExecutor};
use std::time::Duration;

pub struct DryRunExecutor {
    label: String,
}

impl DryRunExecutor {
    /// `target` names the store a live run would have written to.
    pub fn new(target: &str) -> Self {
        Self {
            label: format!("dry run ({target})"),
        }
    }
}

impl RemoteExecutor for DryRunExecutor {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute(&self, script: &str, _timeout: Duration) -> Result<(), ExecError> {
        tracing::trace!(bytes = script.len(), "dry run, batch discarded");
        Ok(())
    }
}
