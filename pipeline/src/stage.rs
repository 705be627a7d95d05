//! Shared stage runner.
//!
//! Every stage follows the same contract: load its required inputs (failing
//! with an [`ArtifactError`](crate::io::artifacts::ArtifactError) before the
//! engine or the ledger is touched), decide whether there is work to do,
//! render an instruction, invoke the engine once under the stage's budget and
//! merge exactly one ledger entry under its own key.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::ledger::LedgerEntry;
use crate::core::mend_gate::CleanReason;
use crate::core::types::{EngineOutcome, EngineRun, Stage, StageOutcome};
use crate::io::artifacts::read_required_text;
use crate::io::config::PipelineConfig;
use crate::io::engine::{Engine, EngineRequest};
use crate::io::ledger_store::merge_entry;
use crate::io::prompt::Prompts;

/// UTC calendar date used for reports, transcripts and the cost table.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Why a stage finished without invoking the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoChangeReport,
    Clean(CleanReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Skipped(SkipReason),
    Ran(EngineRun),
}

impl StageStatus {
    /// Pipeline log entry. Skipped stages are not logged.
    pub fn stage_outcome(&self) -> Option<StageOutcome> {
        match self {
            StageStatus::Skipped(_) => None,
            StageStatus::Ran(run) if run.outcome.is_success() => Some(StageOutcome::Success),
            StageStatus::Ran(_) => Some(StageOutcome::Failure),
        }
    }

    pub fn engine_run(&self) -> Option<&EngineRun> {
        match self {
            StageStatus::Ran(run) => Some(run),
            StageStatus::Skipped(_) => None,
        }
    }
}

/// Dependencies shared by every stage of one invocation.
pub struct StageEnv<'a, E: Engine> {
    pub config: &'a PipelineConfig,
    pub engine: &'a E,
    pub prompts: Prompts,
    pub today: String,
}

impl<'a, E: Engine> StageEnv<'a, E> {
    pub fn new(config: &'a PipelineConfig, engine: &'a E, today: String) -> Result<Self> {
        Ok(Self {
            config,
            engine,
            prompts: Prompts::new()?,
            today,
        })
    }

    /// Skill root as shown in instructions.
    pub fn skill_root_display(&self) -> String {
        self.config.skill_root.display().to_string()
    }

    /// The stage's system prompt; a required input.
    pub fn system_prompt(&self, stage: Stage) -> Result<String> {
        let path = self.config.system_prompt_path(stage);
        Ok(read_required_text(&path, "system prompt")?)
    }

    /// Invoke the engine for `stage` and record its spend.
    #[instrument(skip_all, fields(stage = %stage))]
    pub fn execute(&self, stage: Stage, system_prompt: String, prompt: String) -> Result<EngineRun> {
        let budget = self.config.stages.for_stage(stage);
        let transcripts = self.config.transcripts_dir(&self.today);
        let request = EngineRequest {
            stage,
            workdir: self.config.skill_root.clone(),
            system_prompt,
            prompt,
            max_turns: budget.max_turns,
            max_budget_usd: budget.max_budget_usd,
            allowed_tools: budget.allowed_tools.clone(),
            transcript_path: Some(transcripts.join(format!("{}.jsonl", stage.key()))),
            stderr_log_path: Some(transcripts.join(format!("{}.stderr.log", stage.key()))),
        };

        let run = self.engine.run(&request)?;
        report_outcome(&run);

        let mut entry = LedgerEntry::from_run(&run);
        if stage == Stage::Report {
            entry = entry.with_date(&self.today);
        }
        merge_entry(&self.config.cost_ledger_path(), stage.key(), &entry)
            .with_context(|| format!("record {stage} cost"))?;
        Ok(run)
    }
}

fn report_outcome(run: &EngineRun) {
    match run.outcome {
        EngineOutcome::Finished(_) if run.outcome.is_success() => {
            info!(cost_usd = format!("{:.4}", run.cost_usd), turns = run.turns, "engine finished");
        }
        EngineOutcome::Finished(subtype) if run.outcome.budget_exceeded() => {
            warn!(?subtype, cost_usd = run.cost_usd, turns = run.turns, "engine stopped at its budget");
        }
        EngineOutcome::Finished(subtype) => {
            warn!(?subtype, errors = ?run.errors, cost_usd = run.cost_usd, turns = run.turns, "engine reported an error");
        }
        EngineOutcome::NoResult => {
            warn!(turns = run.turns, "engine ended without a result event; recording zero cost");
        }
    }
}
