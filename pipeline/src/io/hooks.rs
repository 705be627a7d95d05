//! External monitor and verify hooks.
//!
//! Hooks are opaque commands. The pipeline only tells them where the shared
//! artifacts live (through the same environment variables the stages honor)
//! and records whether they exited cleanly. What they write is read back by
//! the stages themselves.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::types::{MONITOR_KEY, StageOutcome, VERIFY_KEY};
use crate::io::config::{
    ENV_AGENT_COSTS, ENV_CHANGE_REPORT, ENV_PIPELINE_LOG, ENV_VERIFY_REPORT, PipelineConfig,
};
use crate::io::process::run_with_timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    Monitor,
    Verify,
}

impl HookKind {
    /// Pipeline log key.
    pub fn key(self) -> &'static str {
        match self {
            HookKind::Monitor => MONITOR_KEY,
            HookKind::Verify => VERIFY_KEY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookOutcome {
    Pass,
    Fail,
    /// No command configured.
    Skipped,
}

impl HookOutcome {
    /// Pipeline log entry, if the hook ran at all.
    pub fn stage_outcome(self) -> Option<StageOutcome> {
        match self {
            HookOutcome::Pass => Some(StageOutcome::Success),
            HookOutcome::Fail => Some(StageOutcome::Failure),
            HookOutcome::Skipped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookRequest {
    pub kind: HookKind,
    /// Program followed by its arguments. Empty means "not configured".
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub env: Vec<(&'static str, PathBuf)>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub log_path: PathBuf,
}

impl HookRequest {
    /// Build the request for `kind` from the resolved config.
    pub fn from_config(config: &PipelineConfig, kind: HookKind, date: &str) -> Self {
        let command = match kind {
            HookKind::Monitor => config.hooks.monitor.clone(),
            HookKind::Verify => config.hooks.verify.clone(),
        };
        Self {
            kind,
            command,
            workdir: config.skill_root.clone(),
            env: vec![
                (ENV_CHANGE_REPORT, config.change_report_path()),
                (ENV_VERIFY_REPORT, config.verify_report_path()),
                (ENV_PIPELINE_LOG, config.pipeline_log_path()),
                (ENV_AGENT_COSTS, config.cost_ledger_path()),
            ],
            timeout: Duration::from_secs(config.hooks.timeout_secs),
            output_limit_bytes: config.hooks.output_limit_bytes,
            log_path: config
                .transcripts_dir(date)
                .join(format!("{}.hook.log", kind.key())),
        }
    }
}

pub trait HookRunner {
    fn run(&self, request: &HookRequest) -> Result<HookOutcome>;
}

/// Runs the configured command as a child process.
pub struct CommandHookRunner;

impl HookRunner for CommandHookRunner {
    #[instrument(skip_all, fields(hook = request.kind.key(), timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &HookRequest) -> Result<HookOutcome> {
        let Some((program, args)) = request.command.split_first() else {
            info!("hook not configured, skipping");
            return Ok(HookOutcome::Skipped);
        };
        info!(program = %program, "running hook");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        let output = run_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {} hook", request.kind.key()))?;

        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create hook log dir {}", parent.display()))?;
        }
        fs::write(&request.log_path, output.render_log(request.kind.key()))
            .with_context(|| format!("write hook log {}", request.log_path.display()))?;

        if output.succeeded() {
            Ok(HookOutcome::Pass)
        } else {
            warn!(exit_code = ?output.status.code(), timed_out = output.timed_out, log = %request.log_path.display(), "hook failed");
            Ok(HookOutcome::Fail)
        }
    }
}
