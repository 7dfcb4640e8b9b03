//! Anti-churn gate consulted before any automated action fires.

use chrono::{DateTime, Utc};

use crate::core::action_state::{ActionState, is_within};
use crate::core::drift_spec::DriftSpec;
use crate::core::types::DecisionReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl Admission {
    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Decide whether an action may fire at `now`. First failing rule wins:
/// circuit breaker, cooldown, hourly budget.
///
/// The breaker only closes through an acknowledgment recorded in `state`;
/// elapsed time is never consulted for it.
pub fn admit(state: &ActionState, spec: &DriftSpec, now: DateTime<Utc>) -> Admission {
    if state.consecutive_actions_since_ack >= spec.circuit_breaker_after {
        return Admission::deny(DecisionReason::CircuitOpen);
    }

    if let Some(last) = state.last_action_at
        && spec.cooldown_seconds > 0
        && is_within(now, last, spec.cooldown_seconds)
    {
        return Admission::deny(DecisionReason::Cooldown);
    }

    if spec.max_auto_actions_per_hour == 0 {
        return Admission::deny(DecisionReason::BudgetDisabled);
    }
    let recent = state.actions_in_last_hour(now);
    if recent >= spec.max_auto_actions_per_hour as usize {
        return Admission::deny(DecisionReason::BudgetExhausted);
    }

    Admission {
        allowed: true,
        reason: DecisionReason::Allowed,
    }
}
