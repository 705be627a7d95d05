//! Pipeline controller for `skill-pipeline run`.
//!
//! Runs monitor → update → verify → mend (→ re-verify) → research → report in
//! order. After every step the pipeline log is rewritten so the next step,
//! and the report in particular, sees a durable record. Stage failures are
//! logged and recorded, never fatal: the daily run always reaches the report.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::core::artifacts::PipelineLog;
use crate::core::types::{Stage, StageOutcome};
use crate::io::artifacts::ArtifactError;
use crate::io::engine::Engine;
use crate::io::hooks::{HookKind, HookOutcome, HookRequest, HookRunner};
use crate::io::ledger_store::reset_ledger;
use crate::io::pipeline_log::write_pipeline_log;
use crate::stage::{StageEnv, StageStatus};
use crate::stages::{run_mend, run_report, run_research, run_update};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub skip_research: bool,
}

/// What a pipeline run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub log: PipelineLog,
    pub mend_attempts: u32,
    /// Required inputs that were missing in stages that started.
    pub missing_inputs: Vec<String>,
}

impl RunSummary {
    pub fn missing_input(&self) -> bool {
        !self.missing_inputs.is_empty()
    }
}

struct Run<'e, 'a, E: Engine, H: HookRunner> {
    env: &'e StageEnv<'a, E>,
    hooks: &'e H,
    summary: RunSummary,
}

/// Run the whole pipeline once.
#[instrument(skip_all, fields(date = %env.today, skip_research = options.skip_research))]
pub fn run_pipeline<E: Engine, H: HookRunner>(
    env: &StageEnv<'_, E>,
    hooks: &H,
    options: &RunOptions,
) -> Result<RunSummary> {
    let config = env.config;
    let mut run = Run {
        env,
        hooks,
        summary: RunSummary {
            log: PipelineLog::for_date(&env.today),
            ..RunSummary::default()
        },
    };

    reset_ledger(&config.cost_ledger_path())?;
    if !config.hooks.monitor.is_empty() {
        remove_stale(&config.change_report_path())?;
    }
    if !config.hooks.verify.is_empty() {
        remove_stale(&config.verify_report_path())?;
    }
    run.persist_log()?;

    run.hook(HookKind::Monitor)?;

    if config.change_report_path().exists() {
        run.stage(Stage::Update, run_update)?;
        run.hook(HookKind::Verify)?;
        run.mend_loop()?;
    } else {
        info!("no change report, skipping update, verify and mend");
    }

    if options.skip_research {
        info!("research skipped by request");
    } else {
        for &track in &config.research.tracks {
            run.stage(Stage::Research(track), |env| {
                run_research(env, track).map(|report| report.status)
            })?;
        }
    }

    run.stage(Stage::Report, run_report)?;

    let summary = run.summary;
    let failed = summary.log.failed_stages();
    if failed.is_empty() {
        info!(mend_attempts = summary.mend_attempts, "pipeline finished");
    } else {
        warn!(failed = %failed.join(", "), mend_attempts = summary.mend_attempts, "pipeline finished with failures");
    }
    Ok(summary)
}

impl<E: Engine, H: HookRunner> Run<'_, '_, E, H> {
    fn persist_log(&self) -> Result<()> {
        write_pipeline_log(&self.env.config.pipeline_log_path(), &self.summary.log)
    }

    fn record(&mut self, key: &str, outcome: StageOutcome) -> Result<()> {
        self.summary.log.record(key, outcome);
        self.persist_log()
    }

    fn hook(&mut self, kind: HookKind) -> Result<HookOutcome> {
        let request = HookRequest::from_config(self.env.config, kind, &self.env.today);
        let outcome = match self.hooks.run(&request) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(hook = kind.key(), err = format!("{err:#}"), "hook could not run");
                HookOutcome::Fail
            }
        };
        if let Some(stage_outcome) = outcome.stage_outcome() {
            self.record(kind.key(), stage_outcome)?;
        }
        Ok(outcome)
    }

    /// Run one stage and record its outcome. Only log persistence can fail here.
    fn stage(
        &mut self,
        stage: Stage,
        body: impl FnOnce(&StageEnv<'_, E>) -> Result<StageStatus>,
    ) -> Result<Option<StageStatus>> {
        match body(self.env) {
            Ok(status) => {
                if let Some(outcome) = status.stage_outcome() {
                    self.record(stage.key(), outcome)?;
                }
                Ok(Some(status))
            }
            Err(err) => {
                if let Some(missing) = err.downcast_ref::<ArtifactError>() {
                    error!(stage = %stage, err = %missing, "required input missing");
                    self.summary.missing_inputs.push(missing.to_string());
                } else {
                    error!(stage = %stage, err = format!("{err:#}"), "stage failed");
                }
                self.record(stage.key(), StageOutcome::Failure)?;
                Ok(None)
            }
        }
    }

    /// Mend and re-verify until the gate closes or the attempts run out.
    fn mend_loop(&mut self) -> Result<()> {
        let max_attempts = self.env.config.mend.max_attempts;
        while self.summary.mend_attempts < max_attempts {
            let attempt = self.summary.mend_attempts + 1;
            match self.stage(Stage::Mend, |env| run_mend(env, attempt))? {
                Some(StageStatus::Ran(_)) => self.summary.mend_attempts = attempt,
                Some(StageStatus::Skipped(_)) | None => return Ok(()),
            }
            if self.hook(HookKind::Verify)? == HookOutcome::Skipped {
                info!("no verify hook configured, cannot re-verify after mend");
                return Ok(());
            }
        }
        Ok(())
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed artifact from a previous run");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}
