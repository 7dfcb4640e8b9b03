//! `therapydrift wg check`: evaluate tasks and optionally commit recovery actions.
//!
//! Tasks are checked independently. A failure for one task is recorded in its
//! report and the remaining tasks still run.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::core::engine::{CommitEffect, EvaluationRequest, evaluate};
use crate::core::recovery::validate_task_id;
use crate::exit_codes;
use crate::io::paths::WorkgraphPaths;
use crate::io::report::{LastReport, TaskReport, write_last_report};
use crate::io::spec_block::{extract_spec_block, parse_spec_block};
use crate::io::state_store::{ActionStateStore, VersionedState, is_state_conflict};
use crate::io::wg::GraphWriter;
use crate::io::workgraph::TaskGraph;

/// Attempts per task when the action state changes underneath an evaluation.
pub const MAX_CONFLICT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Append a summary line to each checked task's `wg log`.
    pub write_log: bool,
    /// Commit allowed actions: persist action state and create recovery tasks.
    pub create_followups: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub generated_at: DateTime<Utc>,
    pub reports: Vec<TaskReport>,
}

impl CheckOutcome {
    /// `1` if any task errored, else `3` if any task has findings, else `0`.
    pub fn exit_code(&self) -> i32 {
        if self.reports.iter().any(|r| r.error.is_some()) {
            exit_codes::ERROR
        } else if self.reports.iter().any(TaskReport::has_findings) {
            exit_codes::FINDINGS
        } else {
            exit_codes::OK
        }
    }

    pub fn last_report(&self) -> LastReport {
        LastReport {
            generated_at: self.generated_at,
            tasks: self.reports.clone(),
        }
    }
}

/// Check every task in `task_ids` against `graph`.
pub fn run_check<S: ActionStateStore, W: GraphWriter>(
    graph: &TaskGraph,
    task_ids: &[String],
    store: &S,
    writer: &W,
    options: CheckOptions,
    now: DateTime<Utc>,
) -> CheckOutcome {
    let reports = task_ids
        .iter()
        .map(|task_id| {
            check_task(graph, task_id, store, writer, options, now).unwrap_or_else(|err| {
                error!(task_id = %task_id, err = %format!("{err:#}"), "task check failed");
                let title = graph.get(task_id).map_or(task_id.as_str(), |t| t.title.as_str());
                TaskReport::failed(task_id, title, &err)
            })
        })
        .collect();
    CheckOutcome {
        generated_at: now,
        reports,
    }
}

/// Load the graph under `paths`, run the check, and write `last.json`.
///
/// `last.json` is best-effort: failing to write it is logged and never
/// discards the outcome of actions already committed.
pub fn check_workgraph<S: ActionStateStore, W: GraphWriter>(
    paths: &WorkgraphPaths,
    task_ids: &[String],
    store: &S,
    writer: &W,
    options: CheckOptions,
    now: DateTime<Utc>,
) -> Result<CheckOutcome> {
    let graph = TaskGraph::load(&paths.graph_path).context("load task graph for check")?;
    let outcome = run_check(&graph, task_ids, store, writer, options, now);
    if let Err(err) = write_last_report(&paths.last_report_path, &outcome.last_report()) {
        warn!(
            path = %paths.last_report_path.display(),
            err = %format!("{err:#}"),
            "failed to write last check report"
        );
    }
    Ok(outcome)
}

fn check_task<S: ActionStateStore, W: GraphWriter>(
    graph: &TaskGraph,
    task_id: &str,
    store: &S,
    writer: &W,
    options: CheckOptions,
    now: DateTime<Utc>,
) -> Result<TaskReport> {
    validate_task_id(task_id)?;
    let task = graph
        .get(task_id)
        .ok_or_else(|| anyhow!("task not found: {task_id}"))?;
    let title = if task.title.trim().is_empty() {
        task_id
    } else {
        task.title.as_str()
    };

    let Some(body) = extract_spec_block(&task.description) else {
        debug!(task_id, "no therapydrift block");
        return Ok(TaskReport::without_block(task_id, title));
    };

    let mut report = match parse_spec_block(&body) {
        Ok(spec) => {
            let ledger = graph.ledger_for(task, &spec);
            let followups = graph.followups_for(task_id, &spec);
            let therapy_exists = graph.recovery_task_exists(task_id);

            let mut attempt = 1;
            loop {
                let current = store.load(task_id)?;
                let evaluation = evaluate(
                    &EvaluationRequest {
                        task_id,
                        task_title: title,
                        ledger: &ledger,
                        followups: &followups,
                        action_state: &current.state,
                        spec: &spec,
                        now,
                        recovery_task_exists: therapy_exists,
                        spec_block: Some(body.as_str()),
                    },
                    options.create_followups,
                )?;
                info!(
                    task_id,
                    drift_detected = evaluation.decision.drift_detected,
                    action_allowed = evaluation.decision.action_allowed,
                    reason = evaluation.decision.reason.as_str(),
                    fingerprint = evaluation.threshold.snapshot.fingerprint.short(),
                    "task evaluated"
                );
                let mut report = TaskReport::evaluated(
                    task_id,
                    title,
                    &spec,
                    &evaluation,
                    &current.state,
                    now,
                    therapy_exists,
                );
                let Some(effect) = evaluation.effect else {
                    break report;
                };
                match commit(store, writer, task_id, &current, &effect) {
                    Ok(()) => {
                        report.mark_committed();
                        break report;
                    }
                    Err(err) if is_state_conflict(&err) && attempt < MAX_CONFLICT_ATTEMPTS => {
                        warn!(task_id, attempt, "action state changed during check, retrying");
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Err(err) => {
            warn!(task_id, err = %err, "invalid therapydrift block");
            TaskReport::invalid_spec(task_id, title, &err)
        }
    };

    // Anything committed above stays committed; a log failure is reported
    // alongside it.
    if options.write_log {
        if let Err(err) = writer.log(task_id, &report.log_line()) {
            let err = err.context(format!("write wg log for {task_id}"));
            error!(task_id, err = %format!("{err:#}"), "wg log write failed");
            report.error = Some(format!("{err:#}"));
        }
    }
    Ok(report)
}

/// Claim the action state, then create the recovery task. If the task write
/// fails the previous state is restored, so no action is recorded without
/// its task.
fn commit<S: ActionStateStore, W: GraphWriter>(
    store: &S,
    writer: &W,
    task_id: &str,
    current: &VersionedState,
    effect: &CommitEffect,
) -> Result<()> {
    let claimed = store.compare_and_swap(task_id, current.version, &effect.next_state)?;
    match writer.ensure_task(&effect.recovery_task) {
        Ok(outcome) => {
            info!(task_id, recovery_task = %effect.recovery_task.id, ?outcome, "recovery action committed");
            Ok(())
        }
        Err(err) => {
            warn!(task_id, err = %format!("{err:#}"), "recovery task write failed, restoring action state");
            if let Err(restore_err) = store.compare_and_swap(task_id, claimed, &current.state) {
                error!(task_id, err = %format!("{restore_err:#}"), "failed to restore action state");
                return Err(err.context(format!(
                    "write recovery task {} (action state not restored: {restore_err:#})",
                    effect.recovery_task.id
                )));
            }
            Err(err.context(format!("write recovery task {}", effect.recovery_task.id)))
        }
    }
}
