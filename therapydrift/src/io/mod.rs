//! I/O helpers for therapydrift commands.

pub mod paths;
pub mod process;
pub mod report;
pub mod spec_block;
pub mod state_store;
pub mod wg;
pub mod workgraph;
