//! Daily maintenance pipeline for an SDK skill bundle.
//!
//! Each subcommand runs one stage against the skill root; `run` sequences them
//! all. Exit codes are defined in [`skill_pipeline::exit_codes`].

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use skill_pipeline::compiler::{CompileOutcome, compile_readme};
use skill_pipeline::controller::{RunOptions, run_pipeline};
use skill_pipeline::core::types::ResearchTrack;
use skill_pipeline::exit_codes;
use skill_pipeline::io::artifacts::ArtifactError;
use skill_pipeline::io::config::PipelineConfig;
use skill_pipeline::io::engine::ClaudeEngine;
use skill_pipeline::io::hooks::CommandHookRunner;
use skill_pipeline::logging;
use skill_pipeline::stage::{StageEnv, StageStatus, today_utc};
use skill_pipeline::stages::{run_mend, run_report, run_research, run_update};

#[derive(Parser)]
#[command(
    name = "skill-pipeline",
    version,
    about = "Keep a skill bundle in sync with its upstream SDK"
)]
struct Cli {
    /// Root of the skill bundle.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (default: `<root>/pipeline.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the change report to the skill files.
    Update,
    /// Repair verification failures, if the verify report lists any.
    Mend,
    /// Audit the SDK surface and research upstream issues for one track.
    Research {
        /// default, typescript (ts) or python (py).
        #[arg(long, default_value = "default")]
        track: ResearchTrack,
    },
    /// Write the daily report and update the README cost log.
    Report,
    /// Update the README cost log from the current artifacts only.
    CompileReport,
    /// Run every stage in order.
    Run {
        /// Skip the research tracks.
        #[arg(long)]
        skip_research: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            if let Some(missing) = err.downcast_ref::<ArtifactError>() {
                error!(label = missing.label(), path = %missing.path().display(), "required input missing");
                eprintln!("ERROR: {missing}");
                exit_codes::MISSING_INPUT
            } else {
                eprintln!("{err:#}");
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = PipelineConfig::load(&cli.root, cli.config.as_deref())?;

    let engine = ClaudeEngine::new(config.engine.clone());
    let env = StageEnv::new(&config, &engine, today_utc())?;
    let status = match cli.command {
        Command::Update => run_update(&env)?,
        Command::Mend => run_mend(&env, 1)?,
        Command::Research { track } => run_research(&env, track)?.status,
        Command::Report => run_report(&env)?,
        Command::CompileReport => {
            cmd_compile_report(&env);
            return Ok(exit_codes::OK);
        }
        Command::Run { skip_research } => {
            let summary = run_pipeline(&env, &CommandHookRunner, &RunOptions { skip_research })?;
            return Ok(if summary.missing_input() {
                exit_codes::MISSING_INPUT
            } else {
                exit_codes::OK
            });
        }
    };
    if let StageStatus::Skipped(reason) = status {
        info!(?reason, "stage skipped");
    }
    Ok(exit_codes::OK)
}

/// Compilation problems are warnings; the command always succeeds.
fn cmd_compile_report(env: &StageEnv<'_, ClaudeEngine>) {
    match compile_readme(env.config, &env.today) {
        Ok(CompileOutcome::Updated(row)) => info!(date = %row.date, "cost log row written"),
        Ok(CompileOutcome::NoCostData) => {}
        Err(err) => warn!(err = format!("{err:#}"), "failed to update README cost log"),
    }
}
