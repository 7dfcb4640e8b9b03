//! Single entry point of the drift engine.
//!
//! `ledger → threshold → loop guard → recovery planner`, each stage only
//! reached when the previous one is positive. The engine never touches
//! persisted state: a commit is described as a [`CommitEffect`] that the
//! caller applies atomically.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::action_state::ActionState;
use crate::core::drift_spec::{DriftSpec, RecoveryPlanMode};
use crate::core::error::DriftError;
use crate::core::ledger::SignalLedger;
use crate::core::loop_guard::admit;
use crate::core::recovery::{PlanRequest, plan};
use crate::core::threshold::{self, ThresholdInput, ThresholdOutcome};
use crate::core::types::{Decision, DecisionReason, FollowupTaskRef, TaskDraft};

#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub task_id: &'a str,
    pub task_title: &'a str,
    pub ledger: &'a SignalLedger,
    pub followups: &'a [FollowupTaskRef],
    pub action_state: &'a ActionState,
    pub spec: &'a DriftSpec,
    pub now: DateTime<Utc>,
    pub recovery_task_exists: bool,
    /// Raw therapydrift block of the task, copied into the recovery task.
    pub spec_block: Option<&'a str>,
}

/// What the caller must apply, all-or-nothing, to commit an allowed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEffect {
    pub recovery_task: TaskDraft,
    pub next_state: ActionState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub threshold: ThresholdOutcome,
    /// Present only when `commit` was requested and the action is allowed.
    pub effect: Option<CommitEffect>,
}

/// Evaluate one task. With `commit = false` the result never carries an effect.
pub fn evaluate(request: &EvaluationRequest<'_>, commit: bool) -> Result<Evaluation, DriftError> {
    let spec = request.spec;
    let outcome = threshold::evaluate(&ThresholdInput {
        ledger: request.ledger,
        followups: request.followups,
        spec,
        prior: request.action_state.last_evaluated.as_ref(),
        recovery_task_exists: request.recovery_task_exists,
    });
    debug!(
        task_id = request.task_id,
        signals = outcome.signal_count,
        conditions_met = outcome.conditions_met,
        new_evidence = outcome.new_evidence,
        recovery_pending = outcome.recovery_pending,
        "threshold evaluated"
    );

    if !outcome.drift_detected {
        let reason = if outcome.conditions_met {
            DecisionReason::NoNewEvidence
        } else {
            DecisionReason::NoDrift
        };
        return Ok(finish(Decision::denied(false, reason), outcome));
    }
    if !outcome.new_evidence {
        return Ok(finish(
            Decision::denied(true, DecisionReason::NoNewEvidence),
            outcome,
        ));
    }
    if spec.require_recovery_plan
        && spec.recovery_plan_mode == RecoveryPlanMode::Block
        && !request.recovery_task_exists
    {
        return Ok(finish(
            Decision::denied(true, DecisionReason::RecoveryPlanRequired),
            outcome,
        ));
    }

    let admission = admit(request.action_state, spec, request.now);
    if !admission.allowed {
        return Ok(finish(Decision::denied(true, admission.reason), outcome));
    }

    let draft = plan(&PlanRequest {
        task_id: request.task_id,
        task_title: request.task_title,
        spec,
        fingerprint: &outcome.snapshot.fingerprint,
        findings: &outcome.findings,
        spec_block: request.spec_block,
    })?;

    let effect = commit.then(|| CommitEffect {
        recovery_task: draft.clone(),
        next_state: request
            .action_state
            .record_action(request.now, outcome.snapshot.clone()),
    });
    let decision = Decision {
        drift_detected: true,
        action_allowed: true,
        reason: DecisionReason::Allowed,
        recovery_task_id: Some(draft.id.clone()),
        recovery_task: Some(draft),
    };
    Ok(Evaluation {
        decision,
        threshold: outcome,
        effect,
    })
}

fn finish(decision: Decision, threshold: ThresholdOutcome) -> Evaluation {
    Evaluation {
        decision,
        threshold,
        effect: None,
    }
}
