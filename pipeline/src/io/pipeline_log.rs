//! Persistence for the per-run pipeline log.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::artifacts::PipelineLog;
use crate::io::artifacts::{ArtifactSchema, Loaded, load_optional, write_json_atomic};

const LABEL: &str = "pipeline log";

pub fn load_pipeline_log(path: &Path) -> Option<Loaded<PipelineLog>> {
    load_optional(path, LABEL, ArtifactSchema::PipelineLog)
}

/// Persist the log so it is durable before the next stage starts.
pub fn write_pipeline_log(path: &Path, log: &PipelineLog) -> Result<()> {
    debug!(path = %path.display(), stages = log.outcomes.len(), "writing pipeline log");
    write_json_atomic(path, log).with_context(|| format!("write {LABEL}"))
}
