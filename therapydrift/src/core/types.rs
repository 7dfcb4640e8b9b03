//! Shared deterministic types for the drift engine.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed log line that starts with a drift marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Log entry timestamp. `None` when the entry carried no parseable time;
    /// ordering then falls back to ledger position.
    pub timestamp: Option<DateTime<Utc>>,
    /// The drift marker the line matched (e.g. `Speedrift:`).
    pub source_tag: String,
    pub raw_text: String,
}

/// A task in the host graph believed to be drift-related.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupTaskRef {
    pub id: String,
    /// The configured follow-up prefix the id matched.
    pub prefix_matched: String,
    pub resolved: bool,
}

/// Why the engine did (or did not) authorize an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Drift conditions are not met.
    NoDrift,
    /// Conditions are met but nothing changed since the last recorded action.
    NoNewEvidence,
    /// Too many consecutive actions without a human acknowledgment.
    CircuitOpen,
    /// The previous action is too recent.
    Cooldown,
    /// `max_auto_actions_per_hour = 0`.
    BudgetDisabled,
    /// The trailing-hour action budget is spent.
    BudgetExhausted,
    /// `recovery_plan_mode = "block"` and no recovery task exists yet.
    RecoveryPlanRequired,
    Allowed,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoDrift => "no_drift",
            Self::NoNewEvidence => "no_new_evidence",
            Self::CircuitOpen => "circuit_open",
            Self::Cooldown => "cooldown",
            Self::BudgetDisabled => "budget_disabled",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RecoveryPlanRequired => "recovery_plan_required",
            Self::Allowed => "allowed",
        }
    }
}

/// Kinds of drift evidence surfaced in reports and recovery tasks.
///
/// Variants are declared in report order; sorting a list of kinds yields the
/// order used in log lines and task descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    RepeatedDriftSignals,
    UnresolvedDriftFollowups,
    MissingRecoveryPlan,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatedDriftSignals => "repeated_drift_signals",
            Self::UnresolvedDriftFollowups => "unresolved_drift_followups",
            Self::MissingRecoveryPlan => "missing_recovery_plan",
        }
    }

    /// Next action a human (or the recovery task) should take for this finding.
    pub fn recommended_action(&self) -> &'static str {
        match self {
            Self::RepeatedDriftSignals => {
                "Run a self-healing cycle: tighten touch scope and split hardening work"
            }
            Self::UnresolvedDriftFollowups => {
                "Resolve or re-scope open drift follow-up tasks before adding new scope"
            }
            Self::MissingRecoveryPlan => {
                "Create and complete the drift-therapy recovery task to consolidate remediation"
            }
        }
    }

    pub fn rationale(&self) -> &'static str {
        match self {
            Self::RepeatedDriftSignals => {
                "Repeated drift signals indicate intent is not staying synchronized with execution."
            }
            Self::UnresolvedDriftFollowups => {
                "Stacking unresolved follow-ups compounds execution drift over time."
            }
            Self::MissingRecoveryPlan => {
                "A dedicated recovery lane keeps drift fixes from bloating the current task."
            }
        }
    }
}

/// Content of a recovery task, handed to the task-graph writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub id: String,
    pub title: String,
    pub description: String,
    pub blocked_by: Vec<String>,
    pub tags: Vec<String>,
}

/// Output of a single engine evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub drift_detected: bool,
    pub action_allowed: bool,
    pub reason: DecisionReason,
    pub recovery_task_id: Option<String>,
    pub recovery_task: Option<TaskDraft>,
}

impl Decision {
    pub fn denied(drift_detected: bool, reason: DecisionReason) -> Self {
        Self {
            drift_detected,
            action_allowed: false,
            reason,
            recovery_task_id: None,
            recovery_task: None,
        }
    }
}
