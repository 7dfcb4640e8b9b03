//! Read-only view of the workgraph task store (`.workgraph/graph.jsonl`).
//!
//! Each line is a JSON object; lines with `"kind": "task"` (or no kind) are
//! tasks. Other kinds are skipped.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::drift_spec::DriftSpec;
use crate::core::ledger::SignalLedger;
use crate::core::recovery::RECOVERY_TASK_PREFIX;
use crate::core::types::FollowupTaskRef;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl LogEntry {
    /// RFC 3339 timestamp, if present and parseable.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl GraphTask {
    /// `open` or `in-progress`.
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "open" | "in-progress")
    }
}

#[derive(Debug, Deserialize)]
struct GraphLine {
    #[serde(default)]
    kind: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Value,
}

/// All tasks of a workgraph, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGraph {
    tasks: BTreeMap<String, GraphTask>,
}

impl TaskGraph {
    pub fn from_tasks(tasks: impl IntoIterator<Item = GraphTask>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Load `graph.jsonl`. A missing file is an error: without a graph there is
    /// nothing to check.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading task graph");
        let contents =
            fs::read_to_string(path).with_context(|| format!("read graph {}", path.display()))?;
        let mut tasks = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let parsed: GraphLine = serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))?;
            if parsed.kind.as_deref().is_some_and(|kind| kind != "task") {
                continue;
            }
            let task: GraphTask = serde_json::from_value(parsed.rest)
                .with_context(|| format!("parse task at {} line {}", path.display(), idx + 1))?;
            tasks.push(task);
        }
        debug!(tasks = tasks.len(), "task graph loaded");
        Ok(Self::from_tasks(tasks))
    }

    pub fn get(&self, id: &str) -> Option<&GraphTask> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drift signals in `task`'s log, matched against `spec.signal_prefixes`.
    pub fn ledger_for(&self, task: &GraphTask, spec: &DriftSpec) -> SignalLedger {
        SignalLedger::from_log(
            task.log
                .iter()
                .map(|entry| (entry.parsed_timestamp(), entry.message.as_str())),
            &spec.signal_prefixes,
        )
    }

    /// Follow-ups of `task_id`: other tasks blocked by it whose id matches a
    /// follow-up prefix. The engine's own recovery task is never included.
    pub fn followups_for(&self, task_id: &str, spec: &DriftSpec) -> Vec<FollowupTaskRef> {
        let recovery_id = format!("{RECOVERY_TASK_PREFIX}{task_id}");
        self.tasks
            .values()
            .filter(|t| t.id != task_id && t.id != recovery_id)
            .filter(|t| t.blocked_by.iter().any(|b| b == task_id))
            .filter_map(|t| {
                let prefix = spec
                    .followup_prefixes
                    .iter()
                    .find(|p| t.id.starts_with(p.as_str()))?;
                Some(FollowupTaskRef {
                    id: t.id.clone(),
                    prefix_matched: prefix.clone(),
                    resolved: !t.is_active(),
                })
            })
            .collect()
    }

    /// True if `drift-therapy-<task_id>` exists and is open, in progress, or done.
    pub fn recovery_task_exists(&self, task_id: &str) -> bool {
        self.tasks
            .get(&format!("{RECOVERY_TASK_PREFIX}{task_id}"))
            .is_some_and(|t| t.is_active() || t.status == "done")
    }
}
