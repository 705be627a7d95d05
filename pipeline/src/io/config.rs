//! Pipeline configuration stored in `pipeline.toml` at the skill root.
//!
//! Every path a stage touches is resolved here, once. Artifact locations that
//! external tools share (change report, verify report, pipeline log, cost
//! ledger) may be overridden through environment variables; those lookups
//! happen only in [`PipelineConfig::apply_env`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{ResearchTrack, Stage};

pub const CONFIG_FILE: &str = "pipeline.toml";

pub const ENV_CHANGE_REPORT: &str = "CHANGE_REPORT";
pub const ENV_VERIFY_REPORT: &str = "VERIFY_REPORT";
pub const ENV_PIPELINE_LOG: &str = "PIPELINE_LOG";
pub const ENV_AGENT_COSTS: &str = "AGENT_COSTS";

/// Pipeline configuration (TOML).
///
/// Missing fields default to the values the daily job has always used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the skill bundle. Set from the CLI, never read from the file.
    #[serde(skip)]
    pub skill_root: PathBuf,
    pub paths: ArtifactPaths,
    pub engine: EngineConfig,
    pub stages: StageBudgets,
    pub hooks: HookConfig,
    pub mend: MendConfig,
    pub research: ResearchConfig,
}

/// Artifact locations. Absolute paths default to the system temp directory;
/// relative ones are resolved against the skill root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactPaths {
    pub change_report: PathBuf,
    pub verify_report: PathBuf,
    pub pipeline_log: PathBuf,
    pub cost_ledger: PathBuf,
    /// Engine event streams, one directory per day.
    pub transcripts_dir: PathBuf,
    /// Directory holding the system prompts, `state.json` and the SDK installs.
    pub agent_dir: PathBuf,
    pub state: PathBuf,
    pub reports_dir: PathBuf,
    pub readme: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            change_report: tmp.join("change-report.json"),
            verify_report: tmp.join("verify-report.json"),
            pipeline_log: tmp.join("pipeline-log.json"),
            cost_ledger: tmp.join("agent-costs.json"),
            transcripts_dir: tmp.join("skill-pipeline"),
            agent_dir: PathBuf::from("agent"),
            state: PathBuf::from("agent/state.json"),
            reports_dir: PathBuf::from("reports"),
            readme: PathBuf::from("README.md"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable.
    pub program: String,
    /// Extra arguments appended after the generated ones.
    pub extra_args: Vec<String>,
    /// Variables removed from the engine environment. The engine refuses to
    /// start when it detects it is nested inside another engine session.
    pub strip_env: Vec<String>,
    pub permission_mode: String,
    /// Truncate captured engine stderr beyond this many bytes.
    pub stderr_limit_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            extra_args: Vec::new(),
            strip_env: vec!["CLAUDECODE".to_string()],
            permission_mode: "bypassPermissions".to_string(),
            stderr_limit_bytes: 100_000,
        }
    }
}

/// Resource budget and tool allowance for one stage.
///
/// A `[stages.<name>]` table in the config file replaces the stage's defaults
/// as a whole, so it must list every field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageBudget {
    pub max_turns: u32,
    pub max_budget_usd: f64,
    pub allowed_tools: Vec<String>,
    /// System prompt file, relative to the agent directory.
    pub system_prompt: PathBuf,
}

impl StageBudget {
    fn editing(max_turns: u32, max_budget_usd: f64, system_prompt: &str) -> Self {
        Self {
            max_turns,
            max_budget_usd,
            allowed_tools: tools(&["Read", "Write", "Edit", "MultiEdit", "Bash", "Grep", "Glob"]),
            system_prompt: PathBuf::from(system_prompt),
        }
    }
}

fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageBudgets {
    pub update: StageBudget,
    pub mend: StageBudget,
    pub research: StageBudget,
    pub research_ts: StageBudget,
    pub research_py: StageBudget,
    pub report: StageBudget,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            update: StageBudget::editing(30, 1.0, "system-prompt.md"),
            mend: StageBudget::editing(15, 0.50, "mending-prompt.md"),
            research: StageBudget::editing(40, 2.0, "research-prompt.md"),
            research_ts: StageBudget::editing(60, 3.0, "research-prompt-ts.md"),
            research_py: StageBudget::editing(60, 3.0, "research-prompt-py.md"),
            report: StageBudget {
                max_turns: 10,
                max_budget_usd: 0.25,
                allowed_tools: tools(&["Read", "Write", "Bash", "Glob", "Grep"]),
                system_prompt: PathBuf::from("report-prompt.md"),
            },
        }
    }
}

impl StageBudgets {
    pub fn for_stage(&self, stage: Stage) -> &StageBudget {
        match stage {
            Stage::Update => &self.update,
            Stage::Mend => &self.mend,
            Stage::Research(ResearchTrack::Default) => &self.research,
            Stage::Research(ResearchTrack::Typescript) => &self.research_ts,
            Stage::Research(ResearchTrack::Python) => &self.research_py,
            Stage::Report => &self.report,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &StageBudget)> {
        [
            ("update", &self.update),
            ("mend", &self.mend),
            ("research", &self.research),
            ("research_ts", &self.research_ts),
            ("research_py", &self.research_py),
            ("report", &self.report),
        ]
        .into_iter()
    }
}

/// External commands run around the engine stages. An empty command disables the hook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HookConfig {
    /// Change detector; writes the change report when upstream moved.
    pub monitor: Vec<String>,
    /// Verifier; writes the verify report.
    pub verify: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate hook stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            monitor: Vec::new(),
            verify: Vec::new(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MendConfig {
    /// Mend attempts per pipeline run; each attempt is followed by a re-verify.
    pub max_attempts: u32,
}

impl Default for MendConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResearchConfig {
    /// Tracks run by `skill-pipeline run`, in order.
    pub tracks: Vec<ResearchTrack>,
    /// Interpreter used to probe the installed Python SDK.
    pub python: String,
    pub probe_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            tracks: vec![ResearchTrack::Typescript, ResearchTrack::Python],
            python: "python3".to_string(),
            probe_timeout_secs: 10,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            skill_root: PathBuf::from("."),
            paths: ArtifactPaths::default(),
            engine: EngineConfig::default(),
            stages: StageBudgets::default(),
            hooks: HookConfig::default(),
            mend: MendConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load `<skill_root>/pipeline.toml` (or `config_path`), then apply env overrides.
    pub fn load(skill_root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| skill_root.join(CONFIG_FILE));
        let mut cfg = load_config(&path)?;
        cfg.skill_root = skill_root.to_path_buf();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Override shared artifact paths from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides = [
            (ENV_CHANGE_REPORT, &mut self.paths.change_report),
            (ENV_VERIFY_REPORT, &mut self.paths.verify_report),
            (ENV_PIPELINE_LOG, &mut self.paths.pipeline_log),
            (ENV_AGENT_COSTS, &mut self.paths.cost_ledger),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                debug!(key, value = %value, "artifact path overridden from environment");
                *slot = PathBuf::from(value);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.program.trim().is_empty() {
            return Err(anyhow!("engine.program must be non-empty"));
        }
        if self.engine.stderr_limit_bytes == 0 {
            return Err(anyhow!("engine.stderr_limit_bytes must be > 0"));
        }
        for (name, budget) in self.stages.iter() {
            if budget.max_turns == 0 {
                return Err(anyhow!("stages.{name}.max_turns must be > 0"));
            }
            if budget.max_budget_usd.is_nan() || budget.max_budget_usd <= 0.0 {
                return Err(anyhow!("stages.{name}.max_budget_usd must be > 0"));
            }
            if budget.allowed_tools.is_empty() {
                return Err(anyhow!("stages.{name}.allowed_tools must be a non-empty array"));
            }
        }
        if self.hooks.timeout_secs == 0 {
            return Err(anyhow!("hooks.timeout_secs must be > 0"));
        }
        if self.hooks.output_limit_bytes == 0 {
            return Err(anyhow!("hooks.output_limit_bytes must be > 0"));
        }
        if self.mend.max_attempts == 0 {
            return Err(anyhow!("mend.max_attempts must be > 0"));
        }
        if self.research.probe_timeout_secs == 0 {
            return Err(anyhow!("research.probe_timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Resolve a configured path against the skill root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.skill_root.join(path)
        }
    }

    pub fn change_report_path(&self) -> PathBuf {
        self.resolve(&self.paths.change_report)
    }

    pub fn verify_report_path(&self) -> PathBuf {
        self.resolve(&self.paths.verify_report)
    }

    pub fn pipeline_log_path(&self) -> PathBuf {
        self.resolve(&self.paths.pipeline_log)
    }

    pub fn cost_ledger_path(&self) -> PathBuf {
        self.resolve(&self.paths.cost_ledger)
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.resolve(&self.paths.agent_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.resolve(&self.paths.state)
    }

    pub fn readme_path(&self) -> PathBuf {
        self.resolve(&self.paths.readme)
    }

    /// `reports/<date>.md` under the skill root.
    pub fn daily_report_path(&self, date: &str) -> PathBuf {
        self.resolve(&self.paths.reports_dir).join(format!("{date}.md"))
    }

    pub fn system_prompt_path(&self, stage: Stage) -> PathBuf {
        self.agent_dir().join(&self.stages.for_stage(stage).system_prompt)
    }

    /// Directory for one day's engine transcripts.
    pub fn transcripts_dir(&self, date: &str) -> PathBuf {
        self.resolve(&self.paths.transcripts_dir).join(date)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(PipelineConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[mend]\nmax_attempts = 2\n\n[hooks]\nverify = [\"./verify.sh\", \"--json\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.mend.max_attempts, 2);
        assert_eq!(cfg.hooks.verify, vec!["./verify.sh", "--json"]);
        assert_eq!(cfg.stages.update.max_turns, 30);
        assert_eq!(cfg.engine.strip_env, vec!["CLAUDECODE"]);
    }

    #[test]
    fn env_overrides_shared_artifact_paths() {
        let env: HashMap<&str, &str> = [
            (ENV_CHANGE_REPORT, "/work/change.json"),
            (ENV_PIPELINE_LOG, "/work/log.json"),
            (ENV_VERIFY_REPORT, "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = PipelineConfig::default();
        let default_verify = cfg.paths.verify_report.clone();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(cfg.paths.change_report, PathBuf::from("/work/change.json"));
        assert_eq!(cfg.paths.pipeline_log, PathBuf::from("/work/log.json"));
        assert_eq!(cfg.paths.verify_report, default_verify);
    }

    #[test]
    fn relative_paths_resolve_against_skill_root() {
        let cfg = PipelineConfig {
            skill_root: PathBuf::from("/skills/sdk"),
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.state_path(), PathBuf::from("/skills/sdk/agent/state.json"));
        assert_eq!(
            cfg.daily_report_path("2026-10-19"),
            PathBuf::from("/skills/sdk/reports/2026-10-19.md")
        );
        assert_eq!(
            cfg.system_prompt_path(Stage::Mend),
            PathBuf::from("/skills/sdk/agent/mending-prompt.md")
        );
        assert!(cfg.change_report_path().is_absolute());
    }

    #[test]
    fn validate_rejects_zero_budgets() {
        let mut cfg = PipelineConfig::default();
        cfg.stages.report.max_budget_usd = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("stages.report.max_budget_usd"));
    }
}
