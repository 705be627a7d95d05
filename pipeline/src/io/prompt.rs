//! Task instructions handed to the engine, rendered from embedded templates.
//!
//! Artifacts are embedded as the exact text read from disk so the engine sees
//! whatever the producer wrote, including fields the pipeline ignores.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;
use tracing::debug;

use crate::core::types::ResearchTrack;

const UPDATE_TEMPLATE: &str = include_str!("prompts/update.md");
const MEND_TEMPLATE: &str = include_str!("prompts/mend.md");
const RESEARCH_TEMPLATE: &str = include_str!("prompts/research.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");

#[derive(Debug, Clone, Serialize)]
pub struct UpdateInputs<'a> {
    pub skill_root: String,
    pub change_report: &'a str,
    pub today: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MendInputs<'a> {
    pub skill_root: String,
    pub checks_failed: u64,
    /// 1-based attempt number within the current pipeline run.
    pub attempt: u32,
    pub verify_report: &'a str,
    pub change_report: &'a str,
    pub today: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchInputs<'a> {
    pub track: ResearchTrack,
    pub skill_root: String,
    pub state_path: String,
    pub sdk_version: &'a str,
    /// Where the SDK sources live, or "unknown".
    pub sdk_source_path: String,
    pub last_audited_version: &'a str,
    /// Rendered exclusion list, or "none yet".
    pub exclusions: &'a str,
    pub today: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportInputs<'a> {
    pub skill_root: String,
    pub today: &'a str,
    pub report_path: String,
    pub state: &'a str,
    pub pipeline_log: Option<&'a str>,
    pub pipeline_log_path: String,
    pub change_report: Option<&'a str>,
    pub change_report_path: String,
    pub verify_report: Option<&'a str>,
    pub verify_report_path: String,
    pub cost_ledger: Option<&'a str>,
    pub cost_ledger_path: String,
}

/// Template environment for every stage instruction.
pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        for (name, source) in [
            ("update", UPDATE_TEMPLATE),
            ("mend", MEND_TEMPLATE),
            ("research", RESEARCH_TEMPLATE),
            ("report", REPORT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load {name} template"))?;
        }
        Ok(Self { env })
    }

    pub fn update(&self, inputs: &UpdateInputs<'_>) -> Result<String> {
        let inputs = UpdateInputs {
            change_report: inputs.change_report.trim(),
            ..inputs.clone()
        };
        self.render("update", &inputs)
    }

    pub fn mend(&self, inputs: &MendInputs<'_>) -> Result<String> {
        let inputs = MendInputs {
            verify_report: inputs.verify_report.trim(),
            change_report: inputs.change_report.trim(),
            ..inputs.clone()
        };
        self.render("mend", &inputs)
    }

    pub fn research(&self, inputs: &ResearchInputs<'_>) -> Result<String> {
        self.render("research", inputs)
    }

    pub fn report(&self, inputs: &ReportInputs<'_>) -> Result<String> {
        let inputs = ReportInputs {
            state: inputs.state.trim(),
            pipeline_log: inputs.pipeline_log.map(str::trim),
            change_report: inputs.change_report.map(str::trim),
            verify_report: inputs.verify_report.map(str::trim),
            cost_ledger: inputs.cost_ledger.map(str::trim),
            ..inputs.clone()
        };
        self.render("report", &inputs)
    }

    fn render<S: Serialize>(&self, name: &str, ctx: &S) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} instruction"))?;
        debug!(template = name, bytes = rendered.len(), "rendered instruction");
        Ok(rendered.trim().to_string())
    }
}
