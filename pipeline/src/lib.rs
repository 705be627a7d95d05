//! Daily maintenance pipeline for an SDK skill bundle.
//!
//! Each day the pipeline reacts to an upstream change report, lets an
//! execution engine update the skill files, verifies the result, repairs
//! verification failures, runs exploratory research and finally writes a
//! daily report plus a rolling cost table. The architecture keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (artifact models, ledger merge,
//!   mend gating, research deduplication, cost table splicing). No I/O.
//! - **[`io`]**: Side-effecting operations (artifact files, config, child
//!   processes, the execution engine, prompt rendering).
//!
//! Orchestration modules ([`stage`], [`stages`], [`compiler`], [`controller`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod compiler;
pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod stage;
pub mod stages;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
