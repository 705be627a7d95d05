//! Engine abstraction for stage execution.
//!
//! The [`Engine`] trait decouples stages from the actual backend (the `claude`
//! CLI in headless streaming mode). Tests use scripted engines that return
//! predetermined runs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::events::EventTally;
use crate::core::types::{EngineRun, Stage};
use crate::io::config::EngineConfig;
use crate::io::process::{StreamedOutput, run_streaming};

/// One engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub stage: Stage,
    /// Working directory for the engine (the skill root).
    pub workdir: PathBuf,
    pub system_prompt: String,
    /// Task instruction, fed on stdin.
    pub prompt: String,
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub allowed_tools: Vec<String>,
    /// Raw event stream is copied here when set.
    pub transcript_path: Option<PathBuf>,
    /// Engine stderr is written here when set.
    pub stderr_log_path: Option<PathBuf>,
}

/// Abstraction over execution backends.
pub trait Engine {
    /// Run to completion and fold the event stream.
    ///
    /// Errors are reserved for failures to run the engine at all. A run that
    /// ends without a terminal event is still `Ok`, with
    /// [`EngineOutcome::NoResult`](crate::core::types::EngineOutcome::NoResult).
    fn run(&self, request: &EngineRequest) -> Result<EngineRun>;
}

/// Engine that spawns `claude -p --output-format stream-json`.
#[derive(Debug, Clone)]
pub struct ClaudeEngine {
    config: EngineConfig,
}

impl ClaudeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Fully configured command, without the prompt (which goes to stdin).
    pub fn command(&self, request: &EngineRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("-p")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--max-turns")
            .arg(request.max_turns.to_string())
            .arg("--max-budget-usd")
            .arg(format!("{:.2}", request.max_budget_usd))
            .arg("--allowedTools")
            .arg(request.allowed_tools.join(","))
            .arg("--permission-mode")
            .arg(&self.config.permission_mode)
            .arg("--setting-sources")
            .arg("")
            .arg("--system-prompt")
            .arg(&request.system_prompt)
            .args(&self.config.extra_args)
            .current_dir(&request.workdir);
        for key in &self.config.strip_env {
            cmd.env_remove(key);
        }
        cmd
    }
}

impl Engine for ClaudeEngine {
    #[instrument(skip_all, fields(stage = %request.stage, max_turns = request.max_turns, max_budget_usd = request.max_budget_usd))]
    fn run(&self, request: &EngineRequest) -> Result<EngineRun> {
        info!(workdir = %request.workdir.display(), "starting engine");
        let mut tally = EventTally::default();
        let output = run_streaming(
            self.command(request),
            Some(request.prompt.as_bytes()),
            self.config.stderr_limit_bytes,
            request.transcript_path.as_deref(),
            |line| tally.observe_line(line),
        )
        .with_context(|| format!("run engine for {}", request.stage))?;

        // Log write failures never discard the run.
        if let Some(path) = &request.stderr_log_path
            && let Err(err) = write_stderr_log(path, &output)
        {
            warn!(err = format!("{err:#}"), "failed to write engine stderr log");
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), terminated = tally.is_terminated(), "engine exited with failure status");
        }
        debug!(lines = output.lines, "engine stream closed");
        Ok(tally.finish())
    }
}

fn write_stderr_log(path: &Path, output: &StreamedOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create engine log dir {}", parent.display()))?;
    }
    let mut buf = String::from_utf8_lossy(&output.stderr).into_owned();
    if output.stderr_truncated > 0 {
        buf.push_str(&format!(
            "\n[engine stderr truncated {} bytes]\n",
            output.stderr_truncated
        ));
    }
    fs::write(path, buf).with_context(|| format!("write engine log {}", path.display()))
}
