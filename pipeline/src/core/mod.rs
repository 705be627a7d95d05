//! Deterministic, pure logic shared by the pipeline stages.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifacts;
pub mod cost_table;
pub mod dedup;
pub mod events;
pub mod ledger;
pub mod mend_gate;
pub mod types;
