//! Drift thresholds and the new-evidence gate.
//!
//! Self-authored signals are filtered out before counting or fingerprinting,
//! and an unchanged fingerprint never counts as new evidence. Together these
//! keep the healer's own log lines and tasks from re-triggering it.

use std::collections::BTreeSet;

use crate::core::action_state::EvidenceSnapshot;
use crate::core::drift_spec::DriftSpec;
use crate::core::fingerprint::Fingerprint;
use crate::core::ledger::SignalLedger;
use crate::core::types::{FindingKind, FollowupTaskRef};

/// How many of the most recent signals to carry in reports.
const RECENT_SIGNAL_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct ThresholdInput<'a> {
    pub ledger: &'a SignalLedger,
    pub followups: &'a [FollowupTaskRef],
    pub spec: &'a DriftSpec,
    /// Evidence recorded at the last committed action, if any.
    pub prior: Option<&'a EvidenceSnapshot>,
    /// Whether `drift-therapy-<task>` already exists in the graph.
    pub recovery_task_exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdOutcome {
    /// Conditions met and either new evidence or a pending recovery plan.
    pub drift_detected: bool,
    /// Signal count or unresolved follow-up criterion holds, ignoring history.
    pub conditions_met: bool,
    pub new_evidence: bool,
    /// A recovery plan is required, conditions are met, and no recovery task exists.
    pub recovery_pending: bool,
    pub signal_count: usize,
    /// Signals added since the prior snapshot (all of them without a prior).
    pub new_signal_count: usize,
    pub recent_signals: Vec<String>,
    pub findings: Vec<FindingKind>,
    pub snapshot: EvidenceSnapshot,
}

pub fn evaluate(input: &ThresholdInput<'_>) -> ThresholdOutcome {
    let spec = input.spec;
    let signals = input.ledger.filtered(&spec.ignore_signal_prefixes);
    let signal_count = signals.len();

    let open_followup_ids: BTreeSet<String> = input
        .followups
        .iter()
        .filter(|f| !f.resolved)
        .filter(|f| spec.followup_prefixes.iter().any(|p| f.id.starts_with(p.as_str())))
        .map(|f| f.id.clone())
        .collect();

    let signals_repeated = spec.min_signal_count > 0 && signal_count >= spec.min_signal_count as usize;
    let followups_open = !open_followup_ids.is_empty();
    let conditions_met = signals_repeated || followups_open;

    let fingerprint = Fingerprint::compute(&signals, &open_followup_ids);
    let (new_evidence, new_signal_count) = match input.prior {
        None => (conditions_met, signal_count),
        Some(prior) if prior.fingerprint == fingerprint => (false, 0),
        Some(prior) => {
            let added = signal_count.saturating_sub(prior.signal_count);
            let followups_changed = prior.open_followup_ids != open_followup_ids;
            (
                added >= spec.min_new_signals as usize || followups_changed,
                added,
            )
        }
    };

    let recovery_pending =
        conditions_met && spec.require_recovery_plan && !input.recovery_task_exists;

    let mut findings = Vec::new();
    if signals_repeated {
        findings.push(FindingKind::RepeatedDriftSignals);
    }
    if followups_open {
        findings.push(FindingKind::UnresolvedDriftFollowups);
    }
    if recovery_pending {
        findings.push(FindingKind::MissingRecoveryPlan);
    }

    let recent_signals = signals
        .iter()
        .skip(signal_count.saturating_sub(RECENT_SIGNAL_LIMIT))
        .map(|s| s.raw_text.clone())
        .collect();

    ThresholdOutcome {
        drift_detected: conditions_met && (new_evidence || recovery_pending),
        conditions_met,
        new_evidence: conditions_met && new_evidence,
        recovery_pending,
        signal_count,
        new_signal_count,
        recent_signals,
        findings,
        snapshot: EvidenceSnapshot {
            fingerprint,
            signal_count,
            open_followup_ids,
        },
    }
}
