//! Self-healing drift control loop for workgraph tasks.
//!
//! therapydrift watches a task's log for repeated drift signals and its graph
//! for unresolved drift follow-ups, and decides whether to create a single,
//! deterministic recovery task. Guards (new-evidence gate, cooldown, hourly
//! budget, circuit breaker) keep the healer from becoming a source of drift.
//!
//! - **[`core`]**: Pure, deterministic logic (ledger, thresholds, loop guard,
//!   recovery planning). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (task graph, state store, `wg`
//!   process execution, reports). Isolated behind traits for tests.
//!
//! Orchestration modules ([`check`], [`ack`]) coordinate core logic with I/O
//! to implement CLI commands.

pub mod ack;
pub mod check;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
