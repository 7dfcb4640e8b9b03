use chrono::TimeDelta;
use proptest::prelude::*;
use therapydrift::core::action_state::ActionState;
use therapydrift::core::drift_spec::DriftSpec;
use therapydrift::core::engine::{EvaluationRequest, evaluate};
use therapydrift::core::ledger::SignalLedger;
use therapydrift::test_support::{at, ledger_of, spec_with};

/// Ledger with `n` distinct Speedrift signals, so every new run carries new evidence.
fn growing_ledger(n: usize) -> SignalLedger {
    let lines: Vec<String> = (0..n).map(|i| format!("Speedrift: yellow #{i}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    ledger_of(&refs)
}

fn evaluate_at(
    spec: &DriftSpec,
    state: &ActionState,
    ledger: &SignalLedger,
    offset_secs: i64,
    commit: bool,
) -> Option<ActionState> {
    let now = at("2026-02-16T00:00:00Z") + TimeDelta::seconds(offset_secs);
    let evaluation = evaluate(
        &EvaluationRequest {
            task_id: "t1",
            task_title: "Task one",
            ledger,
            followups: &[],
            action_state: state,
            spec,
            now,
            recovery_task_exists: true,
            spec_block: None,
        },
        commit,
    )
    .expect("evaluate");
    evaluation.effect.map(|effect| effect.next_state)
}

proptest! {
    /// Property: committed actions inside any one-hour window never exceed
    /// `max_auto_actions_per_hour`, whatever the invocation cadence.
    #[test]
    fn prop_hourly_budget_is_never_exceeded(
        max_per_hour in 0u32..4,
        cooldown in 0u64..900,
        gaps in prop::collection::vec(0i64..1200, 1..60),
    ) {
        let spec = spec_with(|s| {
            s.max_auto_actions_per_hour = max_per_hour;
            s.cooldown_seconds = cooldown;
            s.circuit_breaker_after = u32::MAX;
            s.min_signal_count = 1;
        });
        let mut state = ActionState::default();
        let mut offset = 0i64;
        let mut committed: Vec<i64> = Vec::new();

        for (i, gap) in gaps.iter().enumerate() {
            offset += gap;
            let ledger = growing_ledger(i + 1);
            if let Some(next) = evaluate_at(&spec, &state, &ledger, offset, true) {
                state = next;
                committed.push(offset);
            }
        }

        for &start in &committed {
            let in_window = committed
                .iter()
                .filter(|&&t| t >= start && t < start + 3600)
                .count();
            prop_assert!(in_window <= max_per_hour as usize);
        }
    }

    /// Property: the breaker counter never decreases without an acknowledgment,
    /// and no action is committed while it is open.
    #[test]
    fn prop_breaker_counter_is_monotonic(
        breaker in 1u32..5,
        runs in 1usize..40,
    ) {
        let spec = spec_with(|s| {
            s.circuit_breaker_after = breaker;
            s.cooldown_seconds = 0;
            s.max_auto_actions_per_hour = u32::MAX;
            s.min_signal_count = 1;
        });
        let mut state = ActionState::default();
        for i in 0..runs {
            let ledger = growing_ledger(i + 1);
            let before = state.consecutive_actions_since_ack;
            if let Some(next) = evaluate_at(&spec, &state, &ledger, i as i64 * 4000, true) {
                prop_assert!(before < breaker);
                state = next;
            }
            prop_assert!(state.consecutive_actions_since_ack >= before);
            prop_assert!(state.consecutive_actions_since_ack <= breaker);
        }
    }

    /// Property: evaluating without commit never yields a state change.
    #[test]
    fn prop_dry_run_is_pure(signals in 0usize..10, offset in 0i64..100_000) {
        let spec = DriftSpec::default();
        let state = ActionState::default();
        let ledger = growing_ledger(signals);
        prop_assert!(evaluate_at(&spec, &state, &ledger, offset, false).is_none());
    }
}
