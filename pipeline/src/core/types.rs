//! Shared deterministic types for pipeline core logic.
//!
//! These types define stable contracts between stages. They must not depend on
//! external state or I/O; their serialized forms appear in the pipeline log and
//! cost ledger, so renames are breaking changes.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Research track. Each track audits one ecosystem variant of the SDK and keeps
/// its own `researchedIssues` namespace in the pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchTrack {
    /// Single-track layout: research state lives at the top level of `state.json`.
    Default,
    /// TypeScript SDK, state under `typescript` (falls back to the top level).
    Typescript,
    /// Python SDK, state under `python`.
    Python,
}

impl ResearchTrack {
    pub const ALL: [ResearchTrack; 3] = [
        ResearchTrack::Default,
        ResearchTrack::Typescript,
        ResearchTrack::Python,
    ];

    /// Ledger key the track's engine run is recorded under.
    pub fn ledger_key(self) -> &'static str {
        match self {
            ResearchTrack::Default => "research",
            ResearchTrack::Typescript => "research_ts",
            ResearchTrack::Python => "research_py",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResearchTrack::Default => "default",
            ResearchTrack::Typescript => "typescript",
            ResearchTrack::Python => "python",
        }
    }
}

impl fmt::Display for ResearchTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResearchTrack {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "research" => Ok(ResearchTrack::Default),
            "typescript" | "ts" => Ok(ResearchTrack::Typescript),
            "python" | "py" => Ok(ResearchTrack::Python),
            other => Err(anyhow!(
                "unknown research track '{other}' (expected default, typescript or python)"
            )),
        }
    }
}

/// A stage that delegates work to the execution engine.
///
/// Monitor and verify are external hooks and have no variant here; they only
/// appear in the pipeline log under [`MONITOR_KEY`] and [`VERIFY_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Update,
    Mend,
    Research(ResearchTrack),
    Report,
}

impl Stage {
    /// Key used in the cost ledger and the pipeline log.
    pub fn key(self) -> &'static str {
        match self {
            Stage::Update => "update",
            Stage::Mend => "mend",
            Stage::Research(track) => track.ledger_key(),
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Pipeline log key for the external change monitor.
pub const MONITOR_KEY: &str = "monitor";
/// Pipeline log key for the external verifier.
pub const VERIFY_KEY: &str = "verify";

/// Per-stage outcome recorded in the pipeline log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOutcome {
    Success,
    Failure,
}

/// Terminal `result` subtype reported by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    ErrorMaxBudgetUsd,
    ErrorDuringExecution,
    ErrorMaxStructuredOutputRetries,
    #[serde(other)]
    Unrecognized,
}

/// How an engine invocation ended, from the orchestrator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// A terminal `result` event was observed.
    Finished(ResultSubtype),
    /// The event stream ended without a terminal event (engine crashed or was killed).
    NoResult,
}

impl EngineOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, EngineOutcome::Finished(ResultSubtype::Success))
    }

    /// True when the engine stopped on its turn or spend cap.
    pub fn budget_exceeded(self) -> bool {
        matches!(
            self,
            EngineOutcome::Finished(ResultSubtype::ErrorMaxTurns | ResultSubtype::ErrorMaxBudgetUsd)
        )
    }
}

/// Everything the orchestrator keeps from one engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRun {
    pub outcome: EngineOutcome,
    /// Assistant turns observed on the event stream.
    pub turns: u32,
    /// Total cost reported by the terminal event; `0.0` when none arrived.
    pub cost_usd: f64,
    /// Errors listed on the terminal event.
    pub errors: Vec<String>,
}

impl EngineRun {
    pub fn success(cost_usd: f64, turns: u32) -> Self {
        Self {
            outcome: EngineOutcome::Finished(ResultSubtype::Success),
            turns,
            cost_usd,
            errors: Vec::new(),
        }
    }
}
