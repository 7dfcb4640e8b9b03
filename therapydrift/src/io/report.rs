//! Per-task check reports: text rendering, the `wg log` summary line, and the
//! `last.json` artifact.
//!
//! Reports are product output. They are written regardless of `RUST_LOG`.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

use crate::core::action_state::ActionState;
use crate::core::drift_spec::DriftSpec;
use crate::core::engine::Evaluation;
use crate::core::error::DriftError;
use crate::core::types::{Decision, FindingKind};

/// Log line prefix. Also the default ignore prefix, so these lines never
/// count as drift signals.
pub const LOG_PREFIX: &str = "Therapydrift:";
const MAX_LISTED_FOLLOWUPS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    Green,
    Yellow,
    Red,
}

impl Score {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub priority: &'static str,
    pub action: String,
    pub rationale: String,
}

/// Numbers behind a decision, for humans and dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_signal_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_signal_count: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub open_followup_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_evidence: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therapy_task_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_in_last_hour: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_actions_since_ack: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
}

/// Result of checking one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub task_title: String,
    pub score: Score,
    pub spec: Option<DriftSpec>,
    pub telemetry: Telemetry,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Set when the task could not be checked, or when a step after the
    /// evaluation (such as the `wg log` write) failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the recovery task was written to the graph by this run.
    pub action_committed: bool,
}

impl TaskReport {
    fn empty(task_id: &str, task_title: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            task_title: task_title.to_string(),
            score: Score::Green,
            spec: None,
            telemetry: Telemetry::default(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            decision: None,
            error: None,
            action_committed: false,
        }
    }

    /// Task has no therapydrift block: nothing to check.
    pub fn without_block(task_id: &str, task_title: &str) -> Self {
        let mut report = Self::empty(task_id, task_title);
        report.telemetry.note = Some("no therapydrift block".to_string());
        report
    }

    /// Block present but unusable.
    pub fn invalid_spec(task_id: &str, task_title: &str, err: &DriftError) -> Self {
        let mut report = Self::empty(task_id, task_title);
        report.score = Score::Yellow;
        report.telemetry.parse_error = Some(err.to_string());
        report.findings.push(Finding {
            kind: "invalid_therapydrift_spec".to_string(),
            severity: Severity::Warn,
            summary: "therapydrift block present but could not be parsed".to_string(),
            details: None,
        });
        report.recommendations.push(Recommendation {
            priority: "high",
            action: "Fix the therapydrift TOML block so it parses".to_string(),
            rationale:
                "Therapydrift can only guide self-healing when it can read the configuration."
                    .to_string(),
        });
        report
    }

    /// Task could not be evaluated (missing task, I/O failure, invalid id).
    pub fn failed(task_id: &str, task_title: &str, err: &anyhow::Error) -> Self {
        let mut report = Self::empty(task_id, task_title);
        report.score = Score::Red;
        report.error = Some(format!("{err:#}"));
        report
    }

    /// Report for a completed engine evaluation.
    ///
    /// Findings are listed only when drift is detected, so a clean report
    /// (and exit code `0`) means no action is pending.
    pub fn evaluated(
        task_id: &str,
        task_title: &str,
        spec: &DriftSpec,
        evaluation: &Evaluation,
        state: &ActionState,
        now: DateTime<Utc>,
        therapy_task_exists: bool,
    ) -> Self {
        let threshold = &evaluation.threshold;
        let mut report = Self::empty(task_id, task_title);
        report.spec = Some(spec.clone());
        report.telemetry = Telemetry {
            drift_signal_count: Some(threshold.signal_count),
            new_signal_count: Some(threshold.new_signal_count),
            open_followup_ids: threshold
                .snapshot
                .open_followup_ids
                .iter()
                .cloned()
                .collect(),
            fingerprint: Some(threshold.snapshot.fingerprint.to_string()),
            new_evidence: Some(threshold.new_evidence),
            therapy_task_exists: Some(therapy_task_exists),
            actions_in_last_hour: Some(state.actions_in_last_hour(now)),
            consecutive_actions_since_ack: Some(state.consecutive_actions_since_ack),
            last_action_at: state.last_action_at,
            ..Telemetry::default()
        };

        if evaluation.decision.drift_detected {
            for kind in &threshold.findings {
                report.findings.push(finding_for(*kind, task_id, spec, evaluation));
                report.recommendations.push(Recommendation {
                    priority: "high",
                    action: kind.recommended_action().to_string(),
                    rationale: kind.rationale().to_string(),
                });
            }
            report.score = Score::Yellow;
        }
        report.decision = Some(evaluation.decision.clone());
        report
    }

    /// Record that this run wrote the recovery task.
    ///
    /// The task now exists, so `missing_recovery_plan` no longer applies and is
    /// dropped together with its recommendation.
    pub fn mark_committed(&mut self) {
        let resolved = FindingKind::MissingRecoveryPlan;
        self.action_committed = true;
        self.telemetry.therapy_task_exists = Some(true);
        self.findings.retain(|f| f.kind != resolved.as_str());
        self.recommendations
            .retain(|r| r.action != resolved.recommended_action());
    }

    /// Whether this report should make the check exit with "findings".
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }

    /// One-line summary appended to the task's `wg log`.
    pub fn log_line(&self) -> String {
        if self.findings.is_empty() {
            return format!("{LOG_PREFIX} OK (no findings)");
        }
        let mut kinds: Vec<&str> = self.findings.iter().map(|f| f.kind.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        let mut line = format!("{LOG_PREFIX} {} ({})", self.score.as_str(), kinds.join(", "));
        if let Some(next) = self
            .recommendations
            .first()
            .map(|r| r.action.trim())
            .filter(|a| !a.is_empty())
        {
            line.push_str(" | next: ");
            line.push_str(next);
        }
        line
    }

    /// Human-readable rendering for stdout.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", self.task_id, self.task_title);
        if let Some(err) = &self.error {
            let _ = writeln!(out, "error: {err}");
            if self.decision.is_none() {
                return out;
            }
        }
        let _ = writeln!(out, "score: {}", self.score.as_str());
        if let Some(decision) = &self.decision {
            let _ = write!(out, "decision: {}", decision.reason.as_str());
            if decision.action_allowed {
                let _ = write!(out, " (action allowed");
                if let Some(id) = &decision.recovery_task_id {
                    let _ = write!(out, ": {id}");
                }
                let _ = write!(out, ")");
            }
            if self.action_committed {
                let _ = write!(out, " [committed]");
            }
            out.push('\n');
        }
        if self.findings.is_empty() {
            out.push_str("findings: none\n");
            return out;
        }
        out.push_str("findings:\n");
        for finding in &self.findings {
            let severity = match finding.severity {
                Severity::Warn => "warn",
            };
            let _ = writeln!(out, "- [{severity}] {}: {}", finding.kind, finding.summary);
        }
        out
    }
}

fn finding_for(
    kind: FindingKind,
    task_id: &str,
    spec: &DriftSpec,
    evaluation: &Evaluation,
) -> Finding {
    let threshold = &evaluation.threshold;
    let (summary, details) = match kind {
        FindingKind::RepeatedDriftSignals => (
            format!(
                "Task has repeated drift signals ({} >= {})",
                threshold.signal_count, spec.min_signal_count
            ),
            json!({ "recent_signals": threshold.recent_signals }),
        ),
        FindingKind::UnresolvedDriftFollowups => {
            let ids: Vec<&String> = threshold
                .snapshot
                .open_followup_ids
                .iter()
                .take(MAX_LISTED_FOLLOWUPS)
                .collect();
            (
                format!(
                    "Task has unresolved drift follow-up tasks ({})",
                    threshold.snapshot.open_followup_ids.len()
                ),
                json!({ "tasks": ids }),
            )
        }
        FindingKind::MissingRecoveryPlan => (
            "No therapy recovery task exists for this drifting task".to_string(),
            json!({ "expected_task_id": format!("drift-therapy-{task_id}") }),
        ),
    };
    Finding {
        kind: kind.as_str().to_string(),
        severity: Severity::Warn,
        summary,
        details: Some(details),
    }
}

/// Contents of `.workgraph/.therapydrift/last.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastReport {
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
}

/// Atomically replace `last.json`.
///
/// Each writer stages into its own temp file in the same directory. With
/// concurrent checks the last rename wins.
pub fn write_last_report(path: &Path, report: &LastReport) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("report path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut payload = serde_json::to_string_pretty(report).context("serialize report")?;
    payload.push('\n');
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp report in {}", parent.display()))?;
    tmp.write_all(payload.as_bytes())
        .with_context(|| format!("write temp report {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace report {}", path.display()))?;
    Ok(())
}
