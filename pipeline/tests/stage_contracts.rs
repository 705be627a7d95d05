//! Per-stage contract tests.
//!
//! Each stage is driven directly against a scripted engine to check the
//! required-input rules, the mend gate, research deduplication and the
//! single-key ledger merge.

use serde_json::json;

use skill_pipeline::core::types::{EngineOutcome, EngineRun, ResearchTrack, ResultSubtype, Stage};
use skill_pipeline::io::artifacts::ArtifactError;
use skill_pipeline::stage::{SkipReason, StageStatus};
use skill_pipeline::stages::{run_mend, run_report, run_research, run_update};
use skill_pipeline::test_support::{ScriptedEngine, TODAY, TestSkill, write_json};

fn change_report() -> serde_json::Value {
    json!({"oldVersion": "2.4.0", "newVersion": "2.5.0", "changes": ["query() gained a timeout option"]})
}

#[test]
fn update_without_change_report_fails_before_engine_and_ledger() {
    let skill = TestSkill::new();
    let engine = ScriptedEngine::new().then(EngineRun::success(0.4, 9));
    let env = skill.env(&engine);

    let err = run_update(&env).unwrap_err();
    let missing = err.downcast_ref::<ArtifactError>().expect("artifact error");
    assert_eq!(missing.label(), "change report");
    assert_eq!(engine.calls(), 0);
    assert!(skill.ledger().is_none());
}

#[test]
fn update_without_system_prompt_fails_before_engine() {
    let skill = TestSkill::new();
    skill.write_change_report(&change_report());
    skill.remove_system_prompt(Stage::Update);
    let engine = ScriptedEngine::new().then(EngineRun::success(0.4, 9));
    let env = skill.env(&engine);

    let err = run_update(&env).unwrap_err();
    let missing = err.downcast_ref::<ArtifactError>().expect("artifact error");
    assert_eq!(missing.label(), "system prompt");
    assert_eq!(engine.calls(), 0);
    assert!(skill.ledger().is_none());
}

#[test]
fn update_embeds_change_report_and_records_cost() {
    let skill = TestSkill::new();
    skill.write_change_report(&change_report());
    let engine = ScriptedEngine::new().then(EngineRun::success(0.41, 9));
    let env = skill.env(&engine);

    let status = run_update(&env).expect("update");
    assert_eq!(status, StageStatus::Ran(EngineRun::success(0.41, 9)));

    let request = &engine.requests()[0];
    assert_eq!(request.stage, Stage::Update);
    assert_eq!(request.workdir, skill.root());
    assert_eq!(request.system_prompt, "System prompt for update.\n");
    assert!(request.prompt.contains("query() gained a timeout option"));
    assert!(request.prompt.contains(TODAY));

    let ledger = skill.ledger().expect("ledger");
    assert_eq!(ledger, json!({"update": {"costUsd": 0.41, "turns": 9}}));
}

#[test]
fn engine_failure_still_records_cost() {
    let skill = TestSkill::new();
    skill.write_change_report(&change_report());
    let engine = ScriptedEngine::new().then(EngineRun {
        outcome: EngineOutcome::Finished(ResultSubtype::ErrorMaxBudgetUsd),
        turns: 30,
        cost_usd: 1.5,
        errors: Vec::new(),
    });
    let env = skill.env(&engine);

    let status = run_update(&env).expect("update");
    assert!(status.stage_outcome().is_some());
    assert_eq!(skill.ledger().expect("ledger")["update"]["costUsd"], json!(1.5));
}

#[test]
fn mend_with_clean_verify_report_skips_engine() {
    let skill = TestSkill::new();
    skill.write_change_report(&change_report());
    skill.write_verify_report(0);
    let engine = ScriptedEngine::new();
    let env = skill.env(&engine);

    let status = run_mend(&env, 1).expect("mend");
    assert!(matches!(status, StageStatus::Skipped(SkipReason::Clean(_))));
    assert_eq!(engine.calls(), 0);
    assert!(skill.ledger().is_none());
}

#[test]
fn mend_without_verify_report_is_clean() {
    let skill = TestSkill::new();
    let engine = ScriptedEngine::new();
    let env = skill.env(&engine);

    let status = run_mend(&env, 1).expect("mend");
    assert!(matches!(status, StageStatus::Skipped(SkipReason::Clean(_))));
    assert_eq!(engine.calls(), 0);
}

#[test]
fn mend_with_malformed_verify_report_is_missing_input() {
    let skill = TestSkill::new();
    write_json(
        &skill.config().verify_report_path(),
        &json!({"checksFailed": "three"}),
    );
    let engine = ScriptedEngine::new();
    let env = skill.env(&engine);

    let err = run_mend(&env, 1).unwrap_err();
    assert!(err.downcast_ref::<ArtifactError>().is_some());
    assert_eq!(engine.calls(), 0);
}

#[test]
fn mend_overwrites_its_ledger_key_per_attempt() {
    let skill = TestSkill::new();
    skill.write_change_report(&change_report());
    skill.write_verify_report(3);
    skill.write_ledger(&json!({"update": {"costUsd": 0.41, "turns": 9}}));
    let engine = ScriptedEngine::new()
        .then(EngineRun::success(0.2, 5))
        .then(EngineRun::success(0.1, 2));
    let env = skill.env(&engine);

    run_mend(&env, 1).expect("first attempt");
    run_mend(&env, 2).expect("second attempt");

    let prompt = &engine.requests()[1].prompt;
    assert!(prompt.contains("attempt 2"), "prompt was: {prompt}");
    let ledger = skill.ledger().expect("ledger");
    assert_eq!(ledger["mend"], json!({"costUsd": 0.1, "turns": 2}));
    assert_eq!(ledger["update"], json!({"costUsd": 0.41, "turns": 9}));
}

#[test]
fn research_requires_state() {
    let skill = TestSkill::new();
    let engine = ScriptedEngine::new().then(EngineRun::success(0.5, 10));
    let env = skill.env(&engine);

    let err = run_research(&env, ResearchTrack::Default).unwrap_err();
    let missing = err.downcast_ref::<ArtifactError>().expect("artifact error");
    assert_eq!(missing.label(), "state.json");
    assert_eq!(engine.calls(), 0);
    assert!(skill.ledger().is_none());
}

#[test]
fn research_excludes_already_researched_issues() {
    let skill = TestSkill::new();
    skill.write_state(&json!({
        "sdkVersion": "2.5.0",
        "typescript": {
            "lastAuditedVersion": "2.4.0",
            "researchedIssues": {"101": {}, "87": {}, "42": {}}
        },
        "python": {
            "researchedIssues": {"7": {}},
            "registry": {"version": "0.1.9"}
        }
    }));
    let engine = ScriptedEngine::new()
        .then(EngineRun::success(1.0, 40))
        .then(EngineRun::success(0.2, 12));
    let env = skill.env(&engine);

    run_research(&env, ResearchTrack::Typescript).expect("typescript");
    run_research(&env, ResearchTrack::Python).expect("python");

    let requests = engine.requests();
    let ts_prompt = &requests[0].prompt;
    assert!(ts_prompt.contains("(skip these): 42, 87, 101"), "prompt was: {ts_prompt}");
    assert!(ts_prompt.contains("Last audited version: 2.4.0"));
    let py_prompt = &requests[1].prompt;
    assert!(py_prompt.contains("(skip these): 7"), "prompt was: {py_prompt}");
    assert!(py_prompt.contains("Current SDK version: 0.1.9"));
    assert!(py_prompt.contains("Last audited version: none"));

    let ledger = skill.ledger().expect("ledger");
    assert_eq!(ledger["research_ts"]["costUsd"], json!(1.0));
    assert_eq!(ledger["research_py"]["costUsd"], json!(0.2));
}

#[test]
fn research_with_nothing_researched_says_none_yet() {
    let skill = TestSkill::new();
    skill.write_state(&json!({}));
    let state_path = skill.config().state_path();
    let engine = ScriptedEngine::new().then_with(EngineRun::success(0.3, 8), move |_| {
        write_json(&state_path, &json!({"researchedIssues": {"12": {"verdict": "documented"}}}));
    });
    let env = skill.env(&engine);

    let report = run_research(&env, ResearchTrack::Default).expect("research");

    assert_eq!(report.new_issues, Some(vec!["12".to_string()]));
    assert!(engine.requests()[0].prompt.contains("(skip these): none yet"));
    let state = skill.state().expect("state");
    assert!(state["researchedIssues"].get("12").is_some());
}

#[test]
fn report_stamps_date_and_tolerates_missing_artifacts() {
    let skill = TestSkill::new();
    let report_path = skill.daily_report_path();
    let engine = ScriptedEngine::new().then_with(EngineRun::success(0.08, 3), move |_| {
        std::fs::write(&report_path, "# Daily report\n").expect("write report");
    });
    let env = skill.env(&engine);

    run_report(&env).expect("report");

    let prompt = &engine.requests()[0].prompt;
    assert!(prompt.contains(&skill.daily_report_path().display().to_string()));
    let ledger = skill.ledger().expect("ledger");
    assert_eq!(
        ledger["report"],
        json!({"costUsd": 0.08, "turns": 3, "date": TODAY})
    );
    let readme = skill.readme();
    assert!(
        readme.contains(&format!(
            "| {TODAY} | — | — | — | — | $0.08 | **$0.08** | Research only |"
        )),
        "README was: {readme}"
    );
}

#[test]
fn report_without_system_prompt_is_missing_input() {
    let skill = TestSkill::new();
    skill.remove_system_prompt(Stage::Report);
    let engine = ScriptedEngine::new();
    let env = skill.env(&engine);

    let err = run_report(&env).unwrap_err();
    assert!(err.downcast_ref::<ArtifactError>().is_some());
    assert_eq!(engine.calls(), 0);
}

#[test]
fn research_reports_only_newly_recorded_issues() {
    for track in [ResearchTrack::Default, ResearchTrack::Typescript] {
        let skill = TestSkill::new();
        // No `typescript` object: the typescript track reads the top level.
        skill.write_state(&json!({"researchedIssues": {"12": {}, "45": {}}}));
        let state_path = skill.config().state_path();
        let engine = ScriptedEngine::new().then_with(EngineRun::success(0.5, 20), move |_| {
            write_json(
                &state_path,
                &json!({"researchedIssues": {"12": {}, "45": {}, "77": {"verdict": "fixed"}}}),
            );
        });
        let env = skill.env(&engine);

        let report = run_research(&env, track).expect("research");

        assert!(engine.requests()[0].prompt.contains("(skip these): 12, 45"));
        assert_eq!(report.new_issues, Some(vec!["77".to_string()]), "track {track}");
    }
}

#[test]
fn research_treats_null_track_objects_as_absent() {
    let skill = TestSkill::new();
    skill.write_state(&json!({
        "researchedIssues": {"3": {}},
        "typescript": null,
        "python": null
    }));
    let engine = ScriptedEngine::new()
        .then(EngineRun::success(0.5, 20))
        .then(EngineRun::success(0.2, 8));
    let env = skill.env(&engine);

    run_research(&env, ResearchTrack::Typescript).expect("typescript");
    run_research(&env, ResearchTrack::Python).expect("python");

    let requests = engine.requests();
    assert!(requests[0].prompt.contains("(skip these): 3"));
    assert!(requests[1].prompt.contains("(skip these): none yet"));
}
