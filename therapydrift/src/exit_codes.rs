//! Stable exit codes for therapydrift CLI commands.

/// Every checked task is clean (or has no therapydrift block).
pub const OK: i32 = 0;
/// A task could not be checked, or the command failed outright.
pub const ERROR: i32 = 1;
/// Invalid command line.
pub const USAGE: i32 = 2;
/// Advisory: at least one task has findings, and nothing errored.
pub const FINDINGS: i32 = 3;
