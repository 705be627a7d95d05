//! Test-only fixtures: an isolated skill root, a scripted engine and scripted hooks.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::types::{EngineRun, ResearchTrack, Stage};
use crate::io::config::{CONFIG_FILE, ENV_CHANGE_REPORT, ENV_VERIFY_REPORT, PipelineConfig};
use crate::io::engine::{Engine, EngineRequest};
use crate::io::hooks::{HookKind, HookOutcome, HookRequest, HookRunner};
use crate::stage::StageEnv;

/// Fixed date used by every fixture.
pub const TODAY: &str = "2026-10-19";

pub const README: &str = "# Claude Agent SDK Skill

Keeps the SDK skill files current.

## Cost Log

| Date | SDK | Update | Mend | Research | Report | Total | Notes |
|------|-----|--------|------|----------|--------|-------|-------|

_Last 7 days. Costs are engine-reported totals per stage._

## License

MIT
";

/// A skill root in a temp directory with every system prompt present and all
/// shared artifacts redirected inside it.
pub struct TestSkill {
    _temp: TempDir,
    config: PipelineConfig,
}

impl Default for TestSkill {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSkill {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("skill");
        let run_dir = temp.path().join("run");
        fs::create_dir_all(root.join("agent")).expect("create agent dir");
        fs::create_dir_all(root.join("reports")).expect("create reports dir");
        fs::create_dir_all(&run_dir).expect("create run dir");

        let mut config = PipelineConfig {
            skill_root: root.clone(),
            ..PipelineConfig::default()
        };
        config.paths.change_report = run_dir.join("change-report.json");
        config.paths.verify_report = run_dir.join("verify-report.json");
        config.paths.pipeline_log = run_dir.join("pipeline-log.json");
        config.paths.cost_ledger = run_dir.join("agent-costs.json");
        config.paths.transcripts_dir = run_dir.join("transcripts");
        config.research.python = "skill-pipeline-missing-python".to_string();
        config.research.probe_timeout_secs = 1;

        for stage in [
            Stage::Update,
            Stage::Mend,
            Stage::Research(ResearchTrack::Default),
            Stage::Research(ResearchTrack::Typescript),
            Stage::Research(ResearchTrack::Python),
            Stage::Report,
        ] {
            fs::write(
                config.system_prompt_path(stage),
                format!("System prompt for {stage}.\n"),
            )
            .expect("write system prompt");
        }
        fs::write(root.join("README.md"), README).expect("write README");

        Self {
            _temp: temp,
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.skill_root
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    /// Stage environment pinned to [`TODAY`].
    pub fn env<'a, E: Engine>(&'a self, engine: &'a E) -> StageEnv<'a, E> {
        StageEnv::new(&self.config, engine, TODAY.to_string()).expect("stage env")
    }

    /// Persist the fixture config as `<root>/pipeline.toml` for the binary.
    pub fn write_config_file(&self) -> PathBuf {
        let path = self.root().join(CONFIG_FILE);
        let contents = toml::to_string(&self.config).expect("serialize config");
        fs::write(&path, contents).expect("write config");
        path
    }

    pub fn write_change_report(&self, value: &Value) {
        write_json(&self.config.change_report_path(), value);
    }

    pub fn write_verify_report(&self, checks_failed: u64) {
        write_json(
            &self.config.verify_report_path(),
            &json!({"checksFailed": checks_failed, "checksRun": 12}),
        );
    }

    pub fn write_state(&self, value: &Value) {
        write_json(&self.config.state_path(), value);
    }

    pub fn write_ledger(&self, value: &Value) {
        write_json(&self.config.cost_ledger_path(), value);
    }

    pub fn write_readme(&self, contents: &str) {
        fs::write(self.config.readme_path(), contents).expect("write README");
    }

    pub fn remove_system_prompt(&self, stage: Stage) {
        fs::remove_file(self.config.system_prompt_path(stage)).expect("remove system prompt");
    }

    pub fn ledger(&self) -> Option<Value> {
        read_json(&self.config.cost_ledger_path())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.config.cost_ledger_path()
    }

    pub fn pipeline_log(&self) -> Option<Value> {
        read_json(&self.config.pipeline_log_path())
    }

    pub fn state(&self) -> Option<Value> {
        read_json(&self.config.state_path())
    }

    pub fn readme(&self) -> String {
        fs::read_to_string(self.config.readme_path()).expect("read README")
    }

    pub fn daily_report_path(&self) -> PathBuf {
        self.config.daily_report_path(TODAY)
    }
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    let mut buf = serde_json::to_string_pretty(value).expect("serialize");
    buf.push('\n');
    fs::write(path, buf).expect("write json");
}

pub fn read_json(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    Some(serde_json::from_str(&raw).expect("parse json"))
}

type Effect = Box<dyn Fn(&EngineRequest)>;

struct ScriptedRun {
    run: EngineRun,
    effect: Option<Effect>,
}

/// Engine that replays predetermined runs in order and records every request.
///
/// An effect can stand in for what the real engine would do to the skill
/// root, such as extending `state.json` or writing the daily report.
#[derive(Default)]
pub struct ScriptedEngine {
    script: RefCell<VecDeque<ScriptedRun>>,
    requests: RefCell<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, run: EngineRun) -> Self {
        self.script
            .borrow_mut()
            .push_back(ScriptedRun { run, effect: None });
        self
    }

    pub fn then_with(self, run: EngineRun, effect: impl Fn(&EngineRequest) + 'static) -> Self {
        self.script.borrow_mut().push_back(ScriptedRun {
            run,
            effect: Some(Box::new(effect)),
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests.borrow().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.requests.borrow().iter().map(|r| r.stage).collect()
    }
}

impl Engine for ScriptedEngine {
    fn run(&self, request: &EngineRequest) -> Result<EngineRun> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted engine has no run left for {}", request.stage))?;
        if let Some(effect) = &next.effect {
            effect(request);
        }
        Ok(next.run)
    }
}

/// Hooks that write canned artifacts instead of running commands.
///
/// The monitor writes `change_report` when set. Each verify call pops the next
/// `checksFailed` value and writes a verify report; an exhausted queue means
/// the verify hook is not configured.
#[derive(Default)]
pub struct ScriptedHooks {
    pub change_report: Option<Value>,
    verify_results: RefCell<VecDeque<u64>>,
    calls: RefCell<Vec<HookKind>>,
}

impl ScriptedHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_report(mut self, value: Value) -> Self {
        self.change_report = Some(value);
        self
    }

    pub fn with_verify_results(self, results: &[u64]) -> Self {
        self.verify_results.borrow_mut().extend(results);
        self
    }

    pub fn calls(&self) -> Vec<HookKind> {
        self.calls.borrow().clone()
    }
}

impl HookRunner for ScriptedHooks {
    fn run(&self, request: &HookRequest) -> Result<HookOutcome> {
        self.calls.borrow_mut().push(request.kind);
        let env_path = |key: &str| {
            request
                .env
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow!("hook request missing {key}"))
        };
        match request.kind {
            HookKind::Monitor => {
                if let Some(report) = &self.change_report {
                    write_json(&env_path(ENV_CHANGE_REPORT)?, report);
                }
                Ok(HookOutcome::Pass)
            }
            HookKind::Verify => match self.verify_results.borrow_mut().pop_front() {
                Some(checks_failed) => {
                    write_json(
                        &env_path(ENV_VERIFY_REPORT)?,
                        &json!({"checksFailed": checks_failed}),
                    );
                    Ok(if checks_failed == 0 {
                        HookOutcome::Pass
                    } else {
                        HookOutcome::Fail
                    })
                }
                None => Ok(HookOutcome::Skipped),
            },
        }
    }
}
