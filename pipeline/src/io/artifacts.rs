//! Reading and writing the JSON artifacts stages exchange.
//!
//! Required artifacts surface an [`ArtifactError`] that the binary maps to
//! exit code 2. Optional artifacts degrade to `None` when they are absent or
//! unreadable, with a warning for the latter.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonschema::validator_for;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// A required input that could not be used.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("could not read {label} at {}", path.display())]
    Missing {
        label: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{label} at {} is malformed: {reason}", path.display())]
    Malformed {
        label: &'static str,
        path: PathBuf,
        reason: String,
    },
}

impl ArtifactError {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactError::Missing { label, .. } | ArtifactError::Malformed { label, .. } => label,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ArtifactError::Missing { path, .. } | ArtifactError::Malformed { path, .. } => path,
        }
    }
}

/// Embedded JSON Schemas for the artifacts the pipeline interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSchema {
    ChangeReport,
    VerifyReport,
    PipelineLog,
    CostLedger,
    PipelineState,
}

impl ArtifactSchema {
    fn source(self) -> &'static str {
        match self {
            ArtifactSchema::ChangeReport => {
                include_str!("../../schemas/change_report.schema.json")
            }
            ArtifactSchema::VerifyReport => {
                include_str!("../../schemas/verify_report.schema.json")
            }
            ArtifactSchema::PipelineLog => include_str!("../../schemas/pipeline_log.schema.json"),
            ArtifactSchema::CostLedger => include_str!("../../schemas/cost_ledger.schema.json"),
            ArtifactSchema::PipelineState => {
                include_str!("../../schemas/pipeline_state.schema.json")
            }
        }
    }

    /// Validate `instance`, returning every violation joined into one message.
    pub fn validate(self, instance: &Value) -> Result<(), String> {
        let schema: Value = serde_json::from_str(self.source())
            .map_err(|err| format!("embedded schema {self:?} is not JSON: {err}"))?;
        let validator =
            validator_for(&schema).map_err(|err| format!("invalid schema {self:?}: {err}"))?;
        if validator.is_valid(instance) {
            return Ok(());
        }
        let messages = validator
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        Err(messages.join("; "))
    }
}

/// A parsed artifact together with the exact text it was parsed from.
///
/// Instructions embed artifacts verbatim, so the raw text is kept alongside
/// the typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub raw: String,
    pub value: T,
}

/// Read a required text input such as a system prompt.
pub fn read_required_text(path: &Path, label: &'static str) -> Result<String, ArtifactError> {
    fs::read_to_string(path).map_err(|source| ArtifactError::Missing {
        label,
        path: path.to_path_buf(),
        source,
    })
}

/// Read an optional text input. Absent and unreadable files both yield `None`.
pub fn read_optional_text(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "optional artifact absent");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "optional artifact unreadable, treating as absent");
            None
        }
    }
}

/// Load, validate and parse a required JSON artifact.
pub fn load_required<T: DeserializeOwned>(
    path: &Path,
    label: &'static str,
    schema: ArtifactSchema,
) -> Result<Loaded<T>, ArtifactError> {
    let raw = read_required_text(path, label)?;
    let value = parse(&raw, schema).map_err(|reason| ArtifactError::Malformed {
        label,
        path: path.to_path_buf(),
        reason,
    })?;
    debug!(label, path = %path.display(), "loaded required artifact");
    Ok(Loaded { raw, value })
}

/// Load an optional JSON artifact; corruption is logged and treated as absence.
pub fn load_optional<T: DeserializeOwned>(
    path: &Path,
    label: &'static str,
    schema: ArtifactSchema,
) -> Option<Loaded<T>> {
    let raw = read_optional_text(path)?;
    match parse(&raw, schema) {
        Ok(value) => Some(Loaded { raw, value }),
        Err(reason) => {
            warn!(label, path = %path.display(), reason = %reason, "ignoring malformed artifact");
            None
        }
    }
}

fn parse<T: DeserializeOwned>(raw: &str, schema: ArtifactSchema) -> Result<T, String> {
    let value: Value = serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))?;
    schema.validate(&value)?;
    serde_json::from_value(value).map_err(|err| err.to_string())
}

/// Pretty-print `value` and atomically replace `path` (temp file + rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("artifact path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
