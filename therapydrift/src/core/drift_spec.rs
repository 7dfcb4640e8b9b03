//! Per-task drift configuration (`DriftSpec`).
//!
//! The TOML block is deserialized into [`RawDriftSpec`] (every field optional,
//! unknown keys ignored) and normalized here: documented defaults for missing
//! fields, clamps, and schema validation.

use serde::{Deserialize, Serialize};

use crate::core::error::DriftError;

pub const SUPPORTED_SCHEMA: u32 = 1;

/// Log prefixes emitted by the drift checkers that feed the ledger.
pub const DEFAULT_SIGNAL_PREFIXES: &[&str] = &[
    "Speedrift:",
    "Specdrift:",
    "Datadrift:",
    "Depsdrift:",
    "Uxdrift:",
    "Therapydrift:",
];
pub const DEFAULT_FOLLOWUP_PREFIXES: &[&str] = &["drift-", "speedrift-pit-"];
pub const DEFAULT_IGNORE_SIGNAL_PREFIXES: &[&str] = &["Therapydrift:"];

/// What a required-but-missing recovery plan does to an action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPlanMode {
    /// Create the recovery task with a "recovery plan required" section.
    #[default]
    Annotate,
    /// Report the drift but leave creating the recovery task to a human.
    Block,
}

/// Therapydrift block as written by humans. Missing keys stay `None`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawDriftSpec {
    pub schema: Option<u32>,
    pub min_signal_count: Option<u32>,
    pub followup_prefixes: Option<Vec<String>>,
    pub require_recovery_plan: Option<bool>,
    pub recovery_plan_mode: Option<RecoveryPlanMode>,
    pub ignore_signal_prefixes: Option<Vec<String>>,
    pub signal_prefixes: Option<Vec<String>>,
    pub cooldown_seconds: Option<u64>,
    pub max_auto_actions_per_hour: Option<u32>,
    pub min_new_signals: Option<u32>,
    pub circuit_breaker_after: Option<u32>,
}

/// Normalized configuration consumed read-only by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftSpec {
    pub schema: u32,
    /// `0` disables the signal-count criterion; follow-ups alone then trigger drift.
    pub min_signal_count: u32,
    pub followup_prefixes: Vec<String>,
    pub require_recovery_plan: bool,
    pub recovery_plan_mode: RecoveryPlanMode,
    pub ignore_signal_prefixes: Vec<String>,
    pub signal_prefixes: Vec<String>,
    pub cooldown_seconds: u64,
    /// `0` disables automated actions entirely.
    pub max_auto_actions_per_hour: u32,
    pub min_new_signals: u32,
    /// Always `>= 1`.
    pub circuit_breaker_after: u32,
}

impl Default for DriftSpec {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            min_signal_count: 2,
            followup_prefixes: owned(DEFAULT_FOLLOWUP_PREFIXES),
            require_recovery_plan: true,
            recovery_plan_mode: RecoveryPlanMode::Annotate,
            ignore_signal_prefixes: owned(DEFAULT_IGNORE_SIGNAL_PREFIXES),
            signal_prefixes: owned(DEFAULT_SIGNAL_PREFIXES),
            cooldown_seconds: 1800,
            max_auto_actions_per_hour: 2,
            min_new_signals: 1,
            circuit_breaker_after: 6,
        }
    }
}

impl DriftSpec {
    /// Apply defaults and clamps to a raw block and reject unknown schemas.
    pub fn from_raw(raw: RawDriftSpec) -> Result<Self, DriftError> {
        let defaults = Self::default();
        let schema = raw.schema.unwrap_or(SUPPORTED_SCHEMA);
        if schema != SUPPORTED_SCHEMA {
            return Err(DriftError::Config(format!(
                "unsupported therapydrift schema: {schema} (expected {SUPPORTED_SCHEMA})"
            )));
        }

        let spec = Self {
            schema,
            min_signal_count: raw.min_signal_count.unwrap_or(defaults.min_signal_count),
            followup_prefixes: non_empty_or(raw.followup_prefixes, defaults.followup_prefixes),
            require_recovery_plan: raw
                .require_recovery_plan
                .unwrap_or(defaults.require_recovery_plan),
            recovery_plan_mode: raw.recovery_plan_mode.unwrap_or_default(),
            ignore_signal_prefixes: non_empty_or(
                raw.ignore_signal_prefixes,
                defaults.ignore_signal_prefixes,
            ),
            signal_prefixes: non_empty_or(raw.signal_prefixes, defaults.signal_prefixes),
            cooldown_seconds: raw.cooldown_seconds.unwrap_or(defaults.cooldown_seconds),
            max_auto_actions_per_hour: raw
                .max_auto_actions_per_hour
                .unwrap_or(defaults.max_auto_actions_per_hour),
            min_new_signals: raw.min_new_signals.unwrap_or(defaults.min_new_signals),
            circuit_breaker_after: raw
                .circuit_breaker_after
                .unwrap_or(defaults.circuit_breaker_after)
                .max(1),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), DriftError> {
        for (field, prefixes) in [
            ("followup_prefixes", &self.followup_prefixes),
            ("ignore_signal_prefixes", &self.ignore_signal_prefixes),
            ("signal_prefixes", &self.signal_prefixes),
        ] {
            if prefixes.iter().any(|p| p.trim().is_empty()) {
                return Err(DriftError::Config(format!(
                    "{field} must not contain empty prefixes"
                )));
            }
        }
        Ok(())
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn non_empty_or(values: Option<Vec<String>>, fallback: Vec<String>) -> Vec<String> {
    match values {
        Some(values) if !values.is_empty() => values,
        _ => fallback,
    }
}
