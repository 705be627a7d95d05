//! Filesystem and process boundaries: artifacts, config, engine, hooks.

pub mod artifacts;
pub mod config;
pub mod engine;
pub mod hooks;
pub mod ledger_store;
pub mod pipeline_log;
pub mod process;
pub mod prompt;
pub mod sdk_probe;
