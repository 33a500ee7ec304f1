//! Wrangler executor — runs `npx wrangler d1 execute <db> --remote --file <tmp>`.
//!
//! The batch script is staged to a temporary `.sql` file (avoids shell
//! escaping and argv size limits). The file lives exactly as long as one
//! `execute` call and is removed on success, failure and timeout alike.
//! On unix the child leads its own process group, so a timeout kills
//! `npx` and every process it started, then reaps the child.

use super::{ExecError, RemoteExecutor};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

pub struct WranglerExecutor {
    program: String,
    base_args: Vec<String>,
    database: String,
    remote: bool,
    working_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    label: String,
}

impl WranglerExecutor {
    /// `npx wrangler ... --remote` against the named D1 database.
    pub fn new(database: impl Into<String>) -> Self {
        let database = database.into();
        Self {
            program: "npx".into(),
            base_args: vec!["wrangler".into()],
            label: format!("wrangler d1 {database} (remote)"),
            database,
            remote: true,
            working_dir: None,
            staging_dir: None,
        }
    }

    /// Replace the launcher (`npx wrangler` by default).
    pub fn with_command(mut self, program: impl Into<String>, base_args: &[&str]) -> Self {
        self.program = program.into();
        self.base_args = base_args.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Target the local dev database instead of `--remote`.
    pub fn local(mut self) -> Self {
        self.remote = false;
        self.label = format!("wrangler d1 {} (local)", self.database);
        self
    }

    /// Directory wrangler runs in (where `wrangler.toml` lives).
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory for staged payloads. Defaults to the system temp dir.
    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn stage(&self, script: &str) -> Result<NamedTempFile, ExecError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("backfill_").suffix(".sql");
        let mut file = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| ExecError::Staging(e.to_string()))?;

        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ExecError::Staging(e.to_string()))?;
        Ok(file)
    }

    fn command(&self, payload: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(["d1", "execute", self.database.as_str()]);
        if self.remote {
            cmd.arg("--remote");
        } else {
            cmd.arg("--local");
        }
        cmd.arg("--file").arg(payload);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl RemoteExecutor for WranglerExecutor {
    fn name(&self) -> &str {
        &self.label
    }

    fn execute(&self, script: &str, timeout: Duration) -> Result<(), ExecError> {
        let staged = self.stage(script)?;
        let result = self.run(staged.path(), timeout);

        if let Err(e) = staged.close() {
            tracing::warn!("failed to remove staged payload: {e}");
        }
        result
    }
}

impl WranglerExecutor {
    fn run(&self, payload: &Path, timeout: Duration) -> Result<(), ExecError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecError::Spawn(format!("runtime: {e}")))?;

        let mut cmd = self.command(payload);
        tracing::debug!(program = %self.program, payload = %payload.display(), "spawning wrangler");

        let output = runtime.block_on(async {
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => return Err(ExecError::Spawn(format!("{}: {e}", self.program))),
            };
            // The group outlives its leader, so keep the id even once the child is reaped.
            let group = child.id();

            match tokio::time::timeout(timeout, collect(&mut child)).await {
                Ok(output) => {
                    output.map_err(|e| ExecError::Spawn(format!("{}: {e}", self.program)))
                }
                Err(_) => {
                    if let Some(pid) = group {
                        kill_group(pid);
                    }
                    if !matches!(child.try_wait(), Ok(Some(_))) {
                        if let Err(e) = child.kill().await {
                            tracing::warn!("failed to reap timed out wrangler: {e}");
                        }
                    }
                    Err(ExecError::TimedOut { after: timeout })
                }
            }
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            stderr.into_owned()
        };
        let detail = if detail.trim().is_empty() {
            format!("exited with {}", output.status)
        } else {
            detail
        };
        Err(ExecError::Failed { detail })
    }
}

/// Wait for exit while draining both pipes, so a chatty child never blocks
/// on a full pipe buffer.
async fn collect(child: &mut Child) -> std::io::Result<Output> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
    Ok(Output {
        status: status?,
        stdout: stdout?,
        stderr: stderr?,
    })
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::warn!(pid, "failed to kill wrangler process group: {e}");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
