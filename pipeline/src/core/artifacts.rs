//! Typed models of the JSON artifacts stages exchange through the filesystem.
//!
//! Only the fields the pipeline acts on are modelled explicitly; everything
//! else a producer writes is kept in `extra` and never interpreted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::types::{ResearchTrack, StageOutcome};

/// Placeholder shown wherever a value is unknown or zero.
pub const PLACEHOLDER: &str = "—";

/// Upstream change detected by the monitor. Absence means "nothing changed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub new_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChangeReport {
    /// `SDK v{old}→v{new}` when both versions are known.
    pub fn version_note(&self) -> Option<String> {
        let old = self.old_version.as_deref()?;
        if old.is_empty() || self.new_version.is_empty() {
            return None;
        }
        Some(format!("SDK v{old}→v{}", self.new_version))
    }
}

/// Output of the external verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub checks_failed: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub version: Option<String>,
}

/// Research bookkeeping for one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackState {
    #[serde(default)]
    pub last_audited_version: Option<String>,
    /// Issue identifier → research notes. Only the keys matter to the pipeline.
    #[serde(default)]
    pub researched_issues: BTreeMap<String, Value>,
    #[serde(default)]
    pub registry: Option<Registry>,
}

/// Persistent pipeline state (`state.json`), owned by the research runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    #[serde(default)]
    pub sdk_version: Option<String>,
    /// Legacy field written before `sdkVersion` existed.
    #[serde(default)]
    pub typescript_sdk_version: Option<String>,
    #[serde(default)]
    pub typescript: Option<TrackState>,
    #[serde(default)]
    pub python: Option<TrackState>,
    /// Single-track layout fields stored at the top level.
    #[serde(flatten)]
    pub root: TrackState,
}

impl PipelineState {
    /// The sub-object a track reads and the research engine run extends.
    ///
    /// TypeScript falls back to the top level for states written before the
    /// per-track split; Python never does.
    pub fn track(&self, track: ResearchTrack) -> Option<&TrackState> {
        match track {
            ResearchTrack::Default => Some(&self.root),
            ResearchTrack::Typescript => Some(self.typescript.as_ref().unwrap_or(&self.root)),
            ResearchTrack::Python => self.python.as_ref(),
        }
    }

    /// Version label for the cost table: `sdkVersion`, then the legacy field.
    pub fn version_label(&self) -> String {
        non_empty(&self.sdk_version)
            .or_else(|| non_empty(&self.typescript_sdk_version))
            .map(|v| format!("v{v}"))
            .unwrap_or_else(|| PLACEHOLDER.to_string())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Per-stage outcomes of the current pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub outcomes: BTreeMap<String, StageOutcome>,
}

impl PipelineLog {
    pub fn for_date(date: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, key: &str, outcome: StageOutcome) {
        self.outcomes.insert(key.to_string(), outcome);
    }

    /// Stage keys whose outcome is `failure`, in key order.
    pub fn failed_stages(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == StageOutcome::Failure)
            .map(|(key, _)| key.as_str())
            .collect()
    }
}
