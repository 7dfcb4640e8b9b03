//! Task-graph writer backed by the `wg` CLI.
//!
//! The [`GraphWriter`] trait decouples check orchestration from the actual
//! host tool. Tests use recording writers that never spawn processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::types::TaskDraft;
use crate::io::process::{CommandOutput, run_command_with_timeout};

pub const DEFAULT_WG_PROGRAM: &str = "wg";
pub const DEFAULT_WG_TIMEOUT: Duration = Duration::from_secs(30);
const WG_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Result of [`GraphWriter::ensure_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    /// A task with the draft's id already exists; treated as success.
    AlreadyExists,
}

/// Writes into the host task graph.
pub trait GraphWriter {
    /// Append `message` to `task_id`'s log.
    fn log(&self, task_id: &str, message: &str) -> Result<()>;

    /// Create the task described by `draft` unless a task with its id exists.
    fn ensure_task(&self, draft: &TaskDraft) -> Result<EnsureOutcome>;
}

/// Writer that shells out to `wg` in the project directory.
#[derive(Debug, Clone)]
pub struct WgCli {
    pub program: String,
    pub project_dir: PathBuf,
    pub timeout: Duration,
}

impl WgCli {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: DEFAULT_WG_PROGRAM.to_string(),
            project_dir: project_dir.into(),
            timeout: DEFAULT_WG_TIMEOUT,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.project_dir);
        cmd
    }

    fn run(&self, cmd: Command, what: &str) -> Result<CommandOutput> {
        let output = run_command_with_timeout(cmd, self.timeout, WG_OUTPUT_LIMIT_BYTES)?;
        if output.timed_out {
            return Err(anyhow!("{what} timed out after {:?}", self.timeout));
        }
        Ok(output)
    }

    fn task_exists(&self, task_id: &str) -> Result<bool> {
        let mut cmd = self.command();
        cmd.arg("show").arg(task_id);
        let output = self.run(cmd, "wg show")?;
        Ok(output.status.success())
    }
}

impl GraphWriter for WgCli {
    #[instrument(skip_all, fields(task_id = %task_id))]
    fn log(&self, task_id: &str, message: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("log").arg(task_id).arg(message);
        let output = self.run(cmd, "wg log")?;
        if !output.success() {
            return Err(anyhow!(
                "wg log {task_id} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text()
            ));
        }
        debug!("wg log written");
        Ok(())
    }

    #[instrument(skip_all, fields(task_id = %draft.id))]
    fn ensure_task(&self, draft: &TaskDraft) -> Result<EnsureOutcome> {
        if self.task_exists(&draft.id)? {
            debug!("recovery task already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        let mut cmd = self.command();
        cmd.arg("add").arg(&draft.title).arg("--id").arg(&draft.id);
        for dep in &draft.blocked_by {
            cmd.arg("--blocked-by").arg(dep);
        }
        for tag in &draft.tags {
            cmd.arg("--tag").arg(tag);
        }
        cmd.arg("-d").arg(&draft.description);

        let output = self.run(cmd, "wg add")?;
        if !output.success() {
            // Another writer may have created it between `show` and `add`.
            if self.task_exists(&draft.id)? {
                return Ok(EnsureOutcome::AlreadyExists);
            }
            return Err(anyhow!(
                "wg add {} failed with status {:?}: {}",
                draft.id,
                output.status.code(),
                output.stderr_text()
            ));
        }
        info!("recovery task created");
        Ok(EnsureOutcome::Created)
    }
}
