//! Update stage: apply an upstream change to the skill files.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::artifacts::ChangeReport;
use crate::core::types::Stage;
use crate::io::artifacts::{ArtifactSchema, load_required};
use crate::io::engine::Engine;
use crate::io::prompt::UpdateInputs;
use crate::stage::{StageEnv, StageStatus};

/// Run the update stage. The change report is required.
#[instrument(skip_all)]
pub fn run_update<E: Engine>(env: &StageEnv<'_, E>) -> Result<StageStatus> {
    let change_path = env.config.change_report_path();
    let change =
        load_required::<ChangeReport>(&change_path, "change report", ArtifactSchema::ChangeReport)?;
    let system_prompt = env.system_prompt(Stage::Update)?;

    info!(
        skill_root = %env.config.skill_root.display(),
        new_version = %change.value.new_version,
        change_report = %change_path.display(),
        "update starting"
    );
    let prompt = env.prompts.update(&UpdateInputs {
        skill_root: env.skill_root_display(),
        change_report: &change.raw,
        today: &env.today,
    })?;
    let run = env.execute(Stage::Update, system_prompt, prompt)?;
    Ok(StageStatus::Ran(run))
}
