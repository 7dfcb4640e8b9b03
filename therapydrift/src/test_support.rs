//! Test-only builders for specs, ledgers, graph tasks and a recording writer.

use std::cell::RefCell;
use std::collections::BTreeSet;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use crate::core::action_state::EvidenceSnapshot;
use crate::core::drift_spec::DriftSpec;
use crate::core::fingerprint::Fingerprint;
use crate::core::ledger::SignalLedger;
use crate::core::types::{FollowupTaskRef, TaskDraft};
use crate::io::wg::{EnsureOutcome, GraphWriter};
use crate::io::workgraph::{GraphTask, LogEntry};

/// Parse an RFC 3339 instant. Panics on malformed input.
pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap_or_else(|err| panic!("bad test timestamp {rfc3339}: {err}"))
        .with_timezone(&Utc)
}

/// Snapshot with a literal fingerprint and no open follow-ups.
pub fn snapshot(fingerprint: &str, signal_count: usize) -> EvidenceSnapshot {
    EvidenceSnapshot {
        fingerprint: Fingerprint::from_hex(fingerprint),
        signal_count,
        open_followup_ids: BTreeSet::new(),
    }
}

/// Default spec with targeted overrides.
pub fn spec_with(edit: impl FnOnce(&mut DriftSpec)) -> DriftSpec {
    let mut spec = DriftSpec::default();
    edit(&mut spec);
    spec
}

/// Ledger from untimestamped log lines, matched against the default markers.
pub fn ledger_of(lines: &[&str]) -> SignalLedger {
    let markers = DriftSpec::default().signal_prefixes;
    SignalLedger::from_log(lines.iter().map(|line| (None, *line)), &markers)
}

pub fn followup(id: &str, resolved: bool) -> FollowupTaskRef {
    FollowupTaskRef {
        id: id.to_string(),
        prefix_matched: "drift-".to_string(),
        resolved,
    }
}

pub fn graph_task(id: &str, status: &str) -> GraphTask {
    GraphTask {
        id: id.to_string(),
        title: format!("{id} title"),
        status: status.to_string(),
        ..GraphTask::default()
    }
}

/// Open task with a default therapydrift block and `signals` Speedrift log lines.
pub fn drifting_task(id: &str, signals: usize) -> GraphTask {
    let mut task = graph_task(id, "in-progress");
    task.description = "Ship it.\n\n```therapydrift\nschema = 1\n```\n".to_string();
    task.log = (0..signals)
        .map(|i| LogEntry {
            timestamp: Some(format!("2026-02-16T10:{:02}:00Z", i % 60)),
            message: format!("Speedrift: yellow (scope_drift #{i})"),
        })
        .collect();
    task
}

/// [`GraphWriter`] that records calls instead of spawning `wg`.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    logs: RefCell<Vec<(String, String)>>,
    created: RefCell<Vec<TaskDraft>>,
    fail_ensure: bool,
    fail_log: bool,
}

impl RecordingWriter {
    /// Writer whose `ensure_task` always fails.
    pub fn failing() -> Self {
        Self {
            fail_ensure: true,
            ..Self::default()
        }
    }

    /// Writer whose `log` always fails; task creation still works.
    pub fn failing_log() -> Self {
        Self {
            fail_log: true,
            ..Self::default()
        }
    }

    pub fn logs(&self) -> Vec<(String, String)> {
        self.logs.borrow().clone()
    }

    pub fn created(&self) -> Vec<TaskDraft> {
        self.created.borrow().clone()
    }

    pub fn created_ids(&self) -> Vec<String> {
        self.created.borrow().iter().map(|d| d.id.clone()).collect()
    }
}

impl GraphWriter for RecordingWriter {
    fn log(&self, task_id: &str, message: &str) -> Result<()> {
        if self.fail_log {
            return Err(anyhow!("wg log exited with status 1"));
        }
        self.logs
            .borrow_mut()
            .push((task_id.to_string(), message.to_string()));
        Ok(())
    }

    fn ensure_task(&self, draft: &TaskDraft) -> Result<EnsureOutcome> {
        if self.fail_ensure {
            return Err(anyhow!("wg add exited with status 1"));
        }
        let mut created = self.created.borrow_mut();
        if created.iter().any(|d| d.id == draft.id) {
            return Ok(EnsureOutcome::AlreadyExists);
        }
        created.push(draft.clone());
        Ok(EnsureOutcome::Created)
    }
}
