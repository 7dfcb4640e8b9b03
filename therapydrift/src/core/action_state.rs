//! Automated-action history for a task and its pure transitions.
//!
//! The record is owned by an external store; the core only derives the next
//! value. Nothing here mutates in place, so a dry run can never leak a change.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::fingerprint::Fingerprint;

/// Width of the hourly action budget window.
pub const BUDGET_WINDOW_SECS: u64 = 3600;
/// Action timestamps older than this are dropped when a new action is recorded.
pub const ACTION_RETENTION_SECS: u64 = 24 * 3600;

/// What the engine saw at the last committed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub fingerprint: Fingerprint,
    /// Number of non-ignored signals in the ledger.
    pub signal_count: usize,
    pub open_followup_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionState {
    pub last_action_at: Option<DateTime<Utc>>,
    /// Committed action times, oldest first, pruned to the retention window.
    pub action_timestamps: Vec<DateTime<Utc>>,
    /// Circuit-breaker counter. Only [`ActionState::acknowledge`] lowers it.
    pub consecutive_actions_since_ack: u32,
    pub total_actions: u64,
    pub last_evaluated: Option<EvidenceSnapshot>,
    pub last_acknowledged_at: Option<DateTime<Utc>>,
}

impl ActionState {
    /// Actions inside the trailing budget window ending at `now`.
    ///
    /// Timestamps after `now` (clock skew) are counted.
    pub fn actions_in_last_hour(&self, now: DateTime<Utc>) -> usize {
        self.action_timestamps
            .iter()
            .filter(|at| is_within(now, **at, BUDGET_WINDOW_SECS))
            .count()
    }

    /// State after committing an action at `now` for the given evidence.
    pub fn record_action(&self, now: DateTime<Utc>, evidence: EvidenceSnapshot) -> Self {
        let mut action_timestamps: Vec<DateTime<Utc>> = self
            .action_timestamps
            .iter()
            .copied()
            .filter(|at| is_within(now, *at, ACTION_RETENTION_SECS))
            .collect();
        action_timestamps.push(now);
        action_timestamps.sort();

        Self {
            last_action_at: Some(now),
            action_timestamps,
            consecutive_actions_since_ack: self.consecutive_actions_since_ack.saturating_add(1),
            total_actions: self.total_actions.saturating_add(1),
            last_evaluated: Some(evidence),
            last_acknowledged_at: self.last_acknowledged_at,
        }
    }

    /// State after a human acknowledged the automated actions (closes the breaker).
    pub fn acknowledge(&self, now: DateTime<Utc>) -> Self {
        Self {
            consecutive_actions_since_ack: 0,
            last_acknowledged_at: Some(now),
            ..self.clone()
        }
    }
}

/// True if `at` is less than `window_secs` before `now` (or after it).
pub(crate) fn is_within(now: DateTime<Utc>, at: DateTime<Utc>, window_secs: u64) -> bool {
    let window = i64::try_from(window_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(at) < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, snapshot};

    #[test]
    fn record_action_increments_counters_and_prunes_old_timestamps() {
        let state = ActionState {
            action_timestamps: vec![at("2026-02-14T09:00:00Z"), at("2026-02-16T10:00:00Z")],
            consecutive_actions_since_ack: 2,
            total_actions: 7,
            ..ActionState::default()
        };
        let now = at("2026-02-16T11:00:00Z");
        let next = state.record_action(now, snapshot("fp", 3));

        assert_eq!(next.last_action_at, Some(now));
        assert_eq!(
            next.action_timestamps,
            vec![at("2026-02-16T10:00:00Z"), now]
        );
        assert_eq!(next.consecutive_actions_since_ack, 3);
        assert_eq!(next.total_actions, 8);
        assert_eq!(next.last_evaluated, Some(snapshot("fp", 3)));
        assert_eq!(state.consecutive_actions_since_ack, 2, "input untouched");
    }

    #[test]
    fn acknowledge_only_resets_breaker_counter() {
        let state = ActionState {
            consecutive_actions_since_ack: 6,
            total_actions: 6,
            last_action_at: Some(at("2026-02-16T10:00:00Z")),
            ..ActionState::default()
        };
        let now = at("2026-02-16T12:00:00Z");
        let acked = state.acknowledge(now);
        assert_eq!(acked.consecutive_actions_since_ack, 0);
        assert_eq!(acked.total_actions, 6);
        assert_eq!(acked.last_action_at, state.last_action_at);
        assert_eq!(acked.last_acknowledged_at, Some(now));
    }

    #[test]
    fn hourly_window_excludes_boundary() {
        let state = ActionState {
            action_timestamps: vec![
                at("2026-02-16T10:00:00Z"),
                at("2026-02-16T10:00:01Z"),
                at("2026-02-16T11:30:00Z"),
            ],
            ..ActionState::default()
        };
        assert_eq!(state.actions_in_last_hour(at("2026-02-16T11:00:00Z")), 2);
    }

    #[test]
    fn time_alone_never_lowers_breaker_counter() {
        let state = ActionState {
            consecutive_actions_since_ack: 4,
            ..ActionState::default()
        };
        let later = state.record_action(at("2026-03-01T00:00:00Z"), snapshot("a", 1));
        assert_eq!(later.consecutive_actions_since_ack, 5);
    }
}
