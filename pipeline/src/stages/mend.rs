//! Mend stage: repair the failures verification found after an update.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::artifacts::{ChangeReport, VerifyReport};
use crate::core::mend_gate::{CleanReason, MendGate};
use crate::core::types::Stage;
use crate::io::artifacts::{ArtifactSchema, load_required};
use crate::io::engine::Engine;
use crate::io::prompt::MendInputs;
use crate::stage::{SkipReason, StageEnv, StageStatus};

/// Run one mend attempt (1-based `attempt`).
///
/// A missing verify report closes the gate. A present but malformed one, or a
/// missing change report once the gate is open, is a missing input.
#[instrument(skip_all, fields(attempt))]
pub fn run_mend<E: Engine>(env: &StageEnv<'_, E>, attempt: u32) -> Result<StageStatus> {
    let verify_path = env.config.verify_report_path();
    if !verify_path.exists() {
        let reason = CleanReason::NoVerifyReport;
        info!(?reason, "nothing to mend");
        return Ok(StageStatus::Skipped(SkipReason::Clean(reason)));
    }
    let verify =
        load_required::<VerifyReport>(&verify_path, "verify report", ArtifactSchema::VerifyReport)?;
    let checks_failed = match MendGate::evaluate(Some(&verify.value)) {
        MendGate::Clean(reason) => {
            info!(?reason, "nothing to mend");
            return Ok(StageStatus::Skipped(SkipReason::Clean(reason)));
        }
        MendGate::NeedsMend { checks_failed } => checks_failed,
    };

    let change = load_required::<ChangeReport>(
        &env.config.change_report_path(),
        "change report",
        ArtifactSchema::ChangeReport,
    )?;
    let system_prompt = env.system_prompt(Stage::Mend)?;

    info!(checks_failed, skill_root = %env.config.skill_root.display(), "mend starting");
    let prompt = env.prompts.mend(&MendInputs {
        skill_root: env.skill_root_display(),
        checks_failed,
        attempt,
        verify_report: &verify.raw,
        change_report: &change.raw,
        today: &env.today,
    })?;
    let run = env.execute(Stage::Mend, system_prompt, prompt)?;
    Ok(StageStatus::Ran(run))
}
