//! Typed failures raised by the drift engine.
//!
//! The shell (`check`, `ack`, `io`) wraps these in `anyhow::Error` and recovers
//! them with `downcast_ref` where a caller needs to branch (conflict retry).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriftError {
    /// Unrecognized `schema` or malformed thresholds in the therapydrift block.
    #[error("invalid therapydrift config: {0}")]
    Config(String),
    /// Compare-and-swap on the persisted action state lost a race.
    #[error(
        "action state conflict for task '{task_id}': expected version {expected}, found {found}"
    )]
    StateConflict {
        task_id: String,
        expected: u64,
        found: u64,
    },
    /// Task id is empty or outside the host graph's id grammar.
    #[error("invalid task id '{0}': must be non-empty and [A-Za-z0-9._-] only")]
    InvalidTaskId(String),
    /// Recovery task description could not be rendered.
    #[error("render recovery task: {0}")]
    Render(String),
}

impl DriftError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::StateConflict { .. })
    }
}
