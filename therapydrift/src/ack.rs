//! `therapydrift wg ack`: human acknowledgment that closes the circuit breaker.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::check::MAX_CONFLICT_ATTEMPTS;
use crate::core::action_state::ActionState;
use crate::core::recovery::validate_task_id;
use crate::io::state_store::{ActionStateStore, is_state_conflict};

/// Reset the consecutive-action counter for `task_id` and return the new state.
pub fn acknowledge<S: ActionStateStore>(
    store: &S,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<ActionState> {
    validate_task_id(task_id)?;
    let mut attempt = 1;
    loop {
        let current = store.load(task_id)?;
        let next = current.state.acknowledge(now);
        match store.compare_and_swap(task_id, current.version, &next) {
            Ok(version) => {
                info!(
                    task_id,
                    version,
                    cleared = current.state.consecutive_actions_since_ack,
                    "drift actions acknowledged"
                );
                return Ok(next);
            }
            Err(err) if is_state_conflict(&err) && attempt < MAX_CONFLICT_ATTEMPTS => {
                warn!(task_id, attempt, "action state changed during ack, retrying");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::drift_spec::DriftSpec;
    use crate::core::loop_guard::admit;
    use crate::core::types::DecisionReason;
    use crate::io::state_store::MemoryStateStore;
    use crate::test_support::{at, snapshot};

    #[test]
    fn ack_closes_the_breaker() {
        let store = MemoryStateStore::new();
        let mut state = ActionState::default();
        for hour in 0..6 {
            state = state.record_action(
                at(&format!("2026-02-16T{:02}:00:00Z", hour)),
                snapshot(&format!("fp{hour}"), hour),
            );
        }
        store.compare_and_swap("t1", 0, &state).expect("seed");
        let now = at("2026-02-16T12:00:00Z");
        assert_eq!(
            admit(&state, &DriftSpec::default(), now).reason,
            DecisionReason::CircuitOpen
        );

        let acked = acknowledge(&store, "t1", now).expect("ack");
        assert_eq!(acked.consecutive_actions_since_ack, 0);
        assert_eq!(acked.total_actions, 6);
        assert_eq!(acked.last_acknowledged_at, Some(now));
        assert_eq!(store.load("t1").expect("load").state, acked);
        assert!(admit(&acked, &DriftSpec::default(), now).allowed);
    }

    #[test]
    fn ack_of_unknown_task_creates_a_record() {
        let store = MemoryStateStore::new();
        let acked = acknowledge(&store, "t9", at("2026-02-16T12:00:00Z")).expect("ack");
        assert_eq!(acked.consecutive_actions_since_ack, 0);
        assert_eq!(store.load("t9").expect("load").version, 1);
    }

    #[test]
    fn ack_rejects_invalid_id() {
        let store = MemoryStateStore::new();
        let err = acknowledge(&store, "bad id", at("2026-02-16T12:00:00Z")).expect_err("invalid");
        assert!(err.to_string().contains("invalid task id"));
    }
}
