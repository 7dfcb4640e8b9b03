//! Deterministic recovery task planning.
//!
//! The recovery task id depends only on the origin task id, so re-running a
//! check always targets the same task and creation is naturally idempotent.

use minijinja::{Environment, context};

use crate::core::drift_spec::DriftSpec;
use crate::core::error::DriftError;
use crate::core::fingerprint::Fingerprint;
use crate::core::types::{FindingKind, TaskDraft};

pub const RECOVERY_TASK_PREFIX: &str = "drift-therapy-";
pub const RECOVERY_PLAN_MARKER: &str = "<!-- therapydrift:recovery-plan -->";

const RECOVERY_TEMPLATE: &str = include_str!("templates/recovery_task.md");
const FALLBACK_ACTION: &str = "Re-synchronize intent, scope, and open drift follow-up tasks.";

#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task_id: &'a str,
    pub task_title: &'a str,
    pub spec: &'a DriftSpec,
    pub fingerprint: &'a Fingerprint,
    pub findings: &'a [FindingKind],
    /// Body of the origin task's therapydrift block, carried into the recovery
    /// task so it is checked under the same thresholds and guards.
    pub spec_block: Option<&'a str>,
}

/// Validate a task id against the host graph's id grammar (`[A-Za-z0-9._-]+`).
pub fn validate_task_id(id: &str) -> Result<(), DriftError> {
    if id.is_empty()
        || id
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(DriftError::InvalidTaskId(id.to_string()));
    }
    Ok(())
}

pub fn recovery_task_id(task_id: &str) -> Result<String, DriftError> {
    validate_task_id(task_id)?;
    Ok(format!("{RECOVERY_TASK_PREFIX}{task_id}"))
}

/// Build the recovery task for `request.task_id`.
pub fn plan(request: &PlanRequest<'_>) -> Result<TaskDraft, DriftError> {
    let id = recovery_task_id(request.task_id)?;
    let title = if request.task_title.trim().is_empty() {
        format!("therapy: {}", request.task_id)
    } else {
        format!("therapy: {}", request.task_title.trim())
    };

    let mut kinds = request.findings.to_vec();
    kinds.sort();
    kinds.dedup();
    let findings: Vec<&str> = kinds.iter().map(FindingKind::as_str).collect();
    let mut actions: Vec<&str> = kinds.iter().map(FindingKind::recommended_action).collect();
    if actions.is_empty() {
        actions.push(FALLBACK_ACTION);
    }

    let description = render_description(
        request.task_id,
        &findings,
        &actions,
        request.fingerprint,
        request.spec.require_recovery_plan,
        request.spec_block.map(str::trim).filter(|b| !b.is_empty()),
    )?;

    Ok(TaskDraft {
        id,
        title,
        description,
        blocked_by: vec![request.task_id.to_string()],
        tags: vec!["drift".to_string(), "therapy".to_string()],
    })
}

fn render_description(
    origin_id: &str,
    findings: &[&str],
    actions: &[&str],
    fingerprint: &Fingerprint,
    require_plan: bool,
    spec_block: Option<&str>,
) -> Result<String, DriftError> {
    let mut env = Environment::new();
    env.add_template("recovery_task", RECOVERY_TEMPLATE)
        .map_err(|err| DriftError::Render(err.to_string()))?;
    let template = env
        .get_template("recovery_task")
        .map_err(|err| DriftError::Render(err.to_string()))?;
    let mut rendered = template
        .render(context! {
            origin_id => origin_id,
            findings => findings,
            actions => actions,
            fingerprint => fingerprint.as_str(),
            require_plan => require_plan,
            plan_marker => RECOVERY_PLAN_MARKER,
            spec_block => spec_block,
        })
        .map_err(|err| DriftError::Render(err.to_string()))?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spec_with;

    fn fingerprint() -> Fingerprint {
        Fingerprint::from_hex("ab".repeat(32))
    }

    #[test]
    fn recovery_id_is_stable() {
        let spec = DriftSpec::default();
        let fp = fingerprint();
        let request = PlanRequest {
            task_id: "T1",
            task_title: "Ship parser",
            spec: &spec,
            fingerprint: &fp,
            findings: &[FindingKind::RepeatedDriftSignals],
            spec_block: None,
        };
        let first = plan(&request).expect("plan");
        let second = plan(&request).expect("plan");
        assert_eq!(first.id, "drift-therapy-T1");
        assert_eq!(first, second);
        assert_eq!(first.title, "therapy: Ship parser");
        assert_eq!(first.blocked_by, vec!["T1"]);
    }

    #[test]
    fn description_references_origin_and_fingerprint() {
        let spec = spec_with(|s| s.require_recovery_plan = true);
        let fp = fingerprint();
        let draft = plan(&PlanRequest {
            task_id: "t1",
            task_title: "Task",
            spec: &spec,
            fingerprint: &fp,
            findings: &[
                FindingKind::UnresolvedDriftFollowups,
                FindingKind::RepeatedDriftSignals,
            ],
            spec_block: None,
        })
        .expect("plan");
        assert!(draft.description.contains("- Origin task: t1"));
        assert!(draft.description.contains(fp.as_str()));
        assert!(draft.description.contains(
            "- Findings: repeated_drift_signals, unresolved_drift_followups"
        ));
        assert!(draft.description.contains("## Recovery plan (required)"));
        assert!(draft.description.contains(RECOVERY_PLAN_MARKER));
    }

    #[test]
    fn plan_section_omitted_when_not_required() {
        let spec = spec_with(|s| s.require_recovery_plan = false);
        let fp = fingerprint();
        let draft = plan(&PlanRequest {
            task_id: "t1",
            task_title: "",
            spec: &spec,
            fingerprint: &fp,
            findings: &[],
            spec_block: None,
        })
        .expect("plan");
        assert!(!draft.description.contains(RECOVERY_PLAN_MARKER));
        assert!(!draft.description.contains("```therapydrift"));
        assert!(draft.description.contains(FALLBACK_ACTION));
        assert_eq!(draft.title, "therapy: t1");
    }

    #[test]
    fn description_ends_with_origin_block() {
        let spec = spec_with(|s| s.require_recovery_plan = true);
        let fp = fingerprint();
        let body = "schema = 1\nmin_signal_count = 2\ncooldown_seconds = 600";
        let draft = plan(&PlanRequest {
            task_id: "t1",
            task_title: "Task",
            spec: &spec,
            fingerprint: &fp,
            findings: &[FindingKind::RepeatedDriftSignals],
            spec_block: Some(body),
        })
        .expect("plan");
        assert!(
            draft
                .description
                .ends_with("```therapydrift\nschema = 1\nmin_signal_count = 2\ncooldown_seconds = 600\n```\n")
        );
        let plan_at = draft.description.find(RECOVERY_PLAN_MARKER).expect("plan section");
        let block_at = draft.description.find("```therapydrift").expect("block");
        assert!(plan_at < block_at);
    }

    #[test]
    fn invalid_task_ids_are_rejected() {
        for bad in ["", "a b", "a/b", "tâche"] {
            assert_eq!(
                recovery_task_id(bad),
                Err(DriftError::InvalidTaskId(bad.to_string()))
            );
        }
    }
}
