//! Deterministic, pure logic of the drift engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures (already loaded by `io`) and return deterministic outputs
//! suitable for tests.

pub mod action_state;
pub mod drift_spec;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod loop_guard;
pub mod recovery;
pub mod threshold;
pub mod types;
