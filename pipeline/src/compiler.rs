//! Report compiler: fold the day's artifacts into the README cost table.
//!
//! Deterministic and engine-free. Every input except the README is optional;
//! without a cost ledger there is nothing to report and the README is left as
//! it is.

use std::fs;

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::artifacts::{ChangeReport, PipelineState};
use crate::core::cost_table::{CostRow, splice_row};
use crate::io::artifacts::{ArtifactSchema, load_optional, write_atomic};
use crate::io::config::PipelineConfig;
use crate::io::ledger_store::load_ledger;
use crate::io::pipeline_log::load_pipeline_log;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    Updated(CostRow),
    /// No readable cost ledger.
    NoCostData,
}

/// Splice today's row into the README.
///
/// Errors (README unreadable, table structure not found) leave the README
/// untouched; callers treat them as warnings.
#[instrument(skip_all, fields(date))]
pub fn compile_readme(config: &PipelineConfig, date: &str) -> Result<CompileOutcome> {
    let Some(ledger) = load_ledger(&config.cost_ledger_path()) else {
        info!("no cost data available, skipping README update");
        return Ok(CompileOutcome::NoCostData);
    };
    let state = load_optional::<PipelineState>(
        &config.state_path(),
        "state.json",
        ArtifactSchema::PipelineState,
    );
    let change = load_optional::<ChangeReport>(
        &config.change_report_path(),
        "change report",
        ArtifactSchema::ChangeReport,
    );
    let log = load_pipeline_log(&config.pipeline_log_path()).filter(|log| {
        let stale = log.value.date.as_deref().is_some_and(|d| d != date);
        if stale {
            info!(log_date = ?log.value.date, "ignoring pipeline log from another day");
        }
        !stale
    });

    let row = CostRow::build(
        date,
        &ledger,
        state.as_ref().map(|l| &l.value),
        change.as_ref().map(|l| &l.value),
        log.as_ref().map(|l| &l.value),
    );

    let readme_path = config.readme_path();
    let readme = fs::read_to_string(&readme_path)
        .with_context(|| format!("read README {}", readme_path.display()))?;
    let updated = splice_row(&readme, &row)
        .with_context(|| format!("update cost log in {}", readme_path.display()))?;
    write_atomic(&readme_path, &updated)?;
    info!(total = format!("{:.2}", row.costs.total()), notes = %row.notes, "README cost log updated");
    Ok(CompileOutcome::Updated(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cost_table::{TableError, row_date};
    use crate::test_support::{TestSkill, write_json};
    use serde_json::json;

    #[test]
    fn missing_ledger_leaves_readme_alone() {
        let skill = TestSkill::new();
        let before = skill.readme();
        let outcome = compile_readme(skill.config(), "2026-10-19").expect("compile");
        assert_eq!(outcome, CompileOutcome::NoCostData);
        assert_eq!(skill.readme(), before);
    }

    #[test]
    fn row_reflects_ledger_state_and_change() {
        let skill = TestSkill::new();
        skill.write_ledger(&json!({
            "update": {"costUsd": 0.41, "turns": 9},
            "research_ts": {"costUsd": 1.0, "turns": 40},
            "research_py": {"costUsd": 0.2, "turns": 12},
            "report": {"costUsd": 0.08, "turns": 3, "date": "2026-10-19"}
        }));
        skill.write_state(&json!({"sdkVersion": "2.5.0"}));
        skill.write_change_report(&json!({"newVersion": "2.5.0", "oldVersion": "2.4.0"}));

        compile_readme(skill.config(), "2026-10-19").expect("compile");
        let readme = skill.readme();
        assert!(readme.contains(
            "| 2026-10-19 | v2.5.0 | $0.41 | — | $1.20 | $0.08 | **$1.69** | SDK v2.4.0→v2.5.0 |"
        ));
    }

    #[test]
    fn rerun_same_day_keeps_one_row() {
        let skill = TestSkill::new();
        skill.write_ledger(&json!({"update": {"costUsd": 0.4, "turns": 9}}));
        compile_readme(skill.config(), "2026-10-19").expect("first");
        skill.write_ledger(&json!({"update": {"costUsd": 0.6, "turns": 9}}));
        compile_readme(skill.config(), "2026-10-19").expect("second");

        let readme = skill.readme();
        let rows: Vec<_> = readme.lines().filter(|l| row_date(l).is_some()).collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("$0.60"));
    }

    #[test]
    fn pipeline_log_from_another_day_is_ignored() {
        let skill = TestSkill::new();
        skill.write_ledger(&json!({"report": {"costUsd": 0.08, "turns": 3}}));
        write_json(
            &skill.config().pipeline_log_path(),
            &json!({"date": "2026-10-18", "outcomes": {"update": "failure"}}),
        );

        let outcome = compile_readme(skill.config(), "2026-10-19").expect("compile");
        let CompileOutcome::Updated(row) = outcome else {
            panic!("expected a row, got {outcome:?}");
        };
        assert_eq!(row.notes, "Research only");

        write_json(
            &skill.config().pipeline_log_path(),
            &json!({"date": "2026-10-19", "outcomes": {"update": "failure"}}),
        );
        compile_readme(skill.config(), "2026-10-19").expect("compile");
        assert!(skill.readme().contains("| Pipeline failed: update |"));
    }

    #[test]
    fn missing_table_is_an_error_and_readme_is_untouched() {
        let skill = TestSkill::new();
        skill.write_ledger(&json!({"update": {"costUsd": 0.4}}));
        skill.write_readme("# Skill\n\nNo cost table here.\n");
        let err = compile_readme(skill.config(), "2026-10-19").unwrap_err();
        assert_eq!(
            err.downcast_ref::<TableError>(),
            Some(&TableError::SectionNotFound)
        );
        assert_eq!(skill.readme(), "# Skill\n\nNo cost table here.\n");
    }
}
