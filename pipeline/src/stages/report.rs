//! Report stage: the engine writes the daily report, then the README cost
//! table is compiled deterministically.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::compiler::compile_readme;
use crate::core::types::Stage;
use crate::io::artifacts::read_optional_text;
use crate::io::engine::Engine;
use crate::io::prompt::ReportInputs;
use crate::stage::{StageEnv, StageStatus};

const EMPTY_STATE: &str = "{}";

/// Run the report stage. Only the system prompt is required.
///
/// Optional artifacts are embedded as read, without validation, so the
/// report can describe whatever the earlier stages left behind.
#[instrument(skip_all)]
pub fn run_report<E: Engine>(env: &StageEnv<'_, E>) -> Result<StageStatus> {
    let config = env.config;
    let system_prompt = env.system_prompt(Stage::Report)?;

    let state = read_optional_text(&config.state_path());
    let pipeline_log = read_optional_text(&config.pipeline_log_path());
    let change_report = read_optional_text(&config.change_report_path());
    let verify_report = read_optional_text(&config.verify_report_path());
    let cost_ledger = read_optional_text(&config.cost_ledger_path());
    let report_path = config.daily_report_path(&env.today);

    info!(
        skill_root = %config.skill_root.display(),
        report_path = %report_path.display(),
        "report starting"
    );
    let prompt = env.prompts.report(&ReportInputs {
        skill_root: env.skill_root_display(),
        today: &env.today,
        report_path: report_path.display().to_string(),
        state: state.as_deref().unwrap_or(EMPTY_STATE),
        pipeline_log: pipeline_log.as_deref(),
        pipeline_log_path: config.pipeline_log_path().display().to_string(),
        change_report: change_report.as_deref(),
        change_report_path: config.change_report_path().display().to_string(),
        verify_report: verify_report.as_deref(),
        verify_report_path: config.verify_report_path().display().to_string(),
        cost_ledger: cost_ledger.as_deref(),
        cost_ledger_path: config.cost_ledger_path().display().to_string(),
    })?;
    let run = env.execute(Stage::Report, system_prompt, prompt)?;

    if report_path.exists() {
        info!(path = %report_path.display(), "daily report written");
    } else {
        warn!(path = %report_path.display(), "daily report was not created");
    }

    if let Err(err) = compile_readme(config, &env.today) {
        warn!(err = format!("{err:#}"), "failed to update README cost log");
    }
    Ok(StageStatus::Ran(run))
}
