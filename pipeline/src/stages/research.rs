//! Research stage: audit the SDK surface and triage upstream issues.
//!
//! The engine owns `state.json` during the run and records what it researched
//! under the track's `researchedIssues`. Identifiers already recorded are
//! passed in as an exclusion list so they are never offered again.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::artifacts::PipelineState;
use crate::core::dedup::{exclusion_list, new_identifiers, render_exclusions};
use crate::core::types::{ResearchTrack, Stage};
use crate::io::artifacts::{ArtifactSchema, load_optional, load_required};
use crate::io::engine::Engine;
use crate::io::prompt::ResearchInputs;
use crate::io::sdk_probe::{SdkProbe, UNKNOWN, probe_python, probe_typescript};
use crate::stage::{StageEnv, StageStatus};

const STATE_LABEL: &str = "state.json";

/// Result of one research track.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchReport {
    pub status: StageStatus,
    /// Identifiers recorded by this run, or `None` when the updated state
    /// could not be read back.
    pub new_issues: Option<Vec<String>>,
}
const NEVER_AUDITED: &str = "none";

/// Run one research track. The pipeline state file is required.
#[instrument(skip_all, fields(track = %track))]
pub fn run_research<E: Engine>(
    env: &StageEnv<'_, E>,
    track: ResearchTrack,
) -> Result<ResearchReport> {
    let stage = Stage::Research(track);
    let state_path = env.config.state_path();
    let state =
        load_required::<PipelineState>(&state_path, STATE_LABEL, ArtifactSchema::PipelineState)?;
    let system_prompt = env.system_prompt(stage)?;

    let track_state = state.value.track(track);
    let before = exclusion_list(track_state);
    let exclusions = render_exclusions(&before);
    let last_audited = track_state
        .and_then(|t| t.last_audited_version.as_deref())
        .unwrap_or(NEVER_AUDITED);
    let probe = probe_sdk(env, track, &state.value);

    info!(
        skill_root = %env.config.skill_root.display(),
        sdk_version = %probe.version,
        last_audited,
        already_researched = before.len(),
        "research starting"
    );
    let prompt = env.prompts.research(&ResearchInputs {
        track,
        skill_root: env.skill_root_display(),
        state_path: state_path.display().to_string(),
        sdk_version: &probe.version,
        sdk_source_path: probe
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        last_audited_version: last_audited,
        exclusions: &exclusions,
        today: &env.today,
    })?;
    let run = env.execute(stage, system_prompt, prompt)?;

    let new_issues =
        match load_optional::<PipelineState>(&state_path, STATE_LABEL, ArtifactSchema::PipelineState) {
            Some(updated) => {
                let added = new_identifiers(&before, updated.value.track(track));
                if added.is_empty() {
                    info!("no new issues researched");
                } else {
                    info!(count = added.len(), ids = %added.join(", "), "new issues researched");
                }
                Some(added)
            }
            None => {
                warn!(path = %state_path.display(), "could not read updated state");
                None
            }
        };
    Ok(ResearchReport {
        status: StageStatus::Ran(run),
        new_issues,
    })
}

fn probe_sdk<E: Engine>(env: &StageEnv<'_, E>, track: ResearchTrack, state: &PipelineState) -> SdkProbe {
    match track {
        ResearchTrack::Typescript => probe_typescript(&env.config.agent_dir()),
        ResearchTrack::Python => probe_python(
            &env.config.research.python,
            Duration::from_secs(env.config.research.probe_timeout_secs),
            state.track(track),
        ),
        ResearchTrack::Default => SdkProbe {
            version: UNKNOWN.to_string(),
            source_path: None,
        },
    }
}
