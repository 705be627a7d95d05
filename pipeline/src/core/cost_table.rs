//! Rolling cost table rendered into the README.
//!
//! The table lives under a fixed section header and looks like:
//!
//! ```text
//! ## Cost Log
//!
//! | Date | SDK | Update | Mend | Research | Report | Total | Notes |
//! |------|-----|--------|------|----------|--------|-------|-------|
//! | 2026-10-19 | v2.5.0 | $0.41 | — | $1.20 | $0.08 | **$1.69** | SDK v2.4.0→v2.5.0 |
//!
//! _Last 7 days. ..._
//! ```
//!
//! Splicing is idempotent per date: the row for `date` is replaced, never
//! duplicated, and the table is capped at [`WINDOW_ROWS`] rows, newest first.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::core::artifacts::{ChangeReport, PLACEHOLDER, PipelineLog, PipelineState};
use crate::core::ledger::{CostBreakdown, CostLedger};

pub const SECTION_HEADER: &str = "## Cost Log";
pub const HEADER_ROW_PREFIX: &str = "| Date";
pub const FOOTNOTE_PREFIX: &str = "_Last 7 days";
pub const WINDOW_ROWS: usize = 7;
pub const RESEARCH_ONLY: &str = "Research only";
/// Date, SDK, Update, Mend, Research, Report, Total, Notes.
pub const COLUMNS: usize = 8;

static ROW_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\|\s*(\d{4}-\d{2}-\d{2})\s*\|").expect("row date regex should be valid")
});

/// Structural problems that prevent splicing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("section '## Cost Log' not found")]
    SectionNotFound,
    #[error("table header row starting with '| Date' not found after section")]
    HeaderRowNotFound,
    #[error("table separator row missing after header")]
    SeparatorNotFound,
    #[error("footnote starting with '_Last 7 days' not found after table")]
    FootnoteNotFound,
    #[error("table header has {found} columns, expected {expected}")]
    ColumnMismatch { expected: usize, found: usize },
}

/// One day's row.
#[derive(Debug, Clone, PartialEq)]
pub struct CostRow {
    pub date: String,
    pub sdk: String,
    pub costs: CostBreakdown,
    pub notes: String,
}

impl CostRow {
    /// Fold the day's artifacts into a row.
    pub fn build(
        date: &str,
        ledger: &CostLedger,
        state: Option<&PipelineState>,
        change: Option<&ChangeReport>,
        log: Option<&PipelineLog>,
    ) -> Self {
        let sdk = state
            .map(PipelineState::version_label)
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        let version_note = change.and_then(ChangeReport::version_note);
        let failed = log.map(PipelineLog::failed_stages).unwrap_or_default();
        let notes = if !failed.is_empty() {
            format!("Pipeline failed: {}", failed.join(", "))
        } else {
            version_note.unwrap_or_else(|| RESEARCH_ONLY.to_string())
        };
        Self {
            date: date.to_string(),
            sdk,
            costs: ledger.breakdown(),
            notes,
        }
    }

    pub fn render(&self) -> String {
        let total = self.costs.total();
        let total = if total > 0.0 {
            format!("**${total:.2}**")
        } else {
            format!("**{PLACEHOLDER}**")
        };
        format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            self.date,
            self.sdk,
            format_cost(self.costs.update),
            format_cost(self.costs.mend),
            format_cost(self.costs.research),
            format_cost(self.costs.report),
            total,
            self.notes
        )
    }
}

/// `$x.xx`, or the placeholder for zero and negative amounts.
pub fn format_cost(value: f64) -> String {
    if value > 0.0 {
        format!("${value:.2}")
    } else {
        PLACEHOLDER.to_string()
    }
}

/// Date of a rendered data row, if it has one.
pub fn row_date(row: &str) -> Option<&str> {
    ROW_DATE_RE
        .captures(row)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Insert `row` at the top of the table in `document`.
///
/// Any existing row for the same date is dropped first, then the table is
/// truncated to `WINDOW_ROWS`. Everything up to and including the separator
/// and everything from the footnote on is preserved byte for byte.
pub fn splice_row(document: &str, row: &CostRow) -> Result<String, TableError> {
    let lines: Vec<&str> = document.split('\n').collect();

    let section_idx = lines
        .iter()
        .position(|l| l.starts_with(SECTION_HEADER))
        .ok_or(TableError::SectionNotFound)?;
    let header_idx = find_after(&lines, section_idx, |l| l.starts_with(HEADER_ROW_PREFIX))
        .ok_or(TableError::HeaderRowNotFound)?;
    let found = column_count(lines[header_idx]);
    if found != COLUMNS {
        return Err(TableError::ColumnMismatch {
            expected: COLUMNS,
            found,
        });
    }
    let separator_idx = header_idx + 1;
    if !lines
        .get(separator_idx)
        .is_some_and(|l| l.trim_start().starts_with('|'))
    {
        return Err(TableError::SeparatorNotFound);
    }
    let footnote_idx = find_after(&lines, separator_idx, |l| l.starts_with(FOOTNOTE_PREFIX))
        .ok_or(TableError::FootnoteNotFound)?;

    let rendered = row.render();
    let mut rows: Vec<&str> = vec![rendered.as_str()];
    rows.extend(
        lines[separator_idx + 1..footnote_idx]
            .iter()
            .copied()
            .filter(|l| l.starts_with('|'))
            .filter(|l| row_date(l) != Some(row.date.as_str())),
    );
    rows.truncate(WINDOW_ROWS);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
    out.extend_from_slice(&lines[..=separator_idx]);
    out.extend(rows);
    out.push("");
    out.extend_from_slice(&lines[footnote_idx..]);
    Ok(out.join("\n"))
}

/// Cells in a `| a | b |` table row.
fn column_count(row: &str) -> usize {
    row.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .count()
}

fn find_after(lines: &[&str], after: usize, pred: impl Fn(&str) -> bool) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(after + 1)
        .find(|(_, l)| pred(l))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::LedgerEntry;
    use crate::core::types::StageOutcome;
    use serde_json::json;

    const HEADER: &str = "| Date | SDK | Update | Mend | Research | Report | Total | Notes |";
    const SEPARATOR: &str = "|------|-----|--------|------|----------|--------|-------|-------|";
    const FOOTNOTE: &str = "_Last 7 days. Costs are engine-reported totals._";

    fn readme(rows: &[String]) -> String {
        let mut doc = vec![
            "# Skill".to_string(),
            String::new(),
            SECTION_HEADER.to_string(),
            String::new(),
            HEADER.to_string(),
            SEPARATOR.to_string(),
        ];
        doc.extend(rows.iter().cloned());
        doc.push(String::new());
        doc.push(FOOTNOTE.to_string());
        doc.push(String::new());
        doc.push("## License".to_string());
        doc.push("MIT".to_string());
        doc.join("\n")
    }

    fn ledger() -> CostLedger {
        let mut ledger = CostLedger::default();
        ledger.record(
            "update",
            &LedgerEntry {
                cost_usd: 0.412,
                turns: Some(9),
                date: None,
            },
        );
        ledger.record(
            "report",
            &LedgerEntry {
                cost_usd: 0.08,
                turns: Some(3),
                date: Some("2026-10-19".to_string()),
            },
        );
        ledger
    }

    fn row(date: &str) -> CostRow {
        CostRow::build(date, &ledger(), None, None, None)
    }

    fn data_rows(doc: &str) -> Vec<&str> {
        doc.lines().filter(|l| row_date(l).is_some()).collect()
    }

    #[test]
    fn header_without_mend_column_is_rejected() {
        let doc = readme(&[]).replace(HEADER, "| Date | SDK | Update | Research | Report | Total | Notes |");
        assert_eq!(
            splice_row(&doc, &row("2026-10-19")),
            Err(TableError::ColumnMismatch {
                expected: COLUMNS,
                found: 7
            })
        );
    }

    #[test]
    fn format_cost_uses_placeholder_for_zero() {
        assert_eq!(format_cost(0.0), PLACEHOLDER);
        assert_eq!(format_cost(1.005), "$1.00");
        assert_eq!(format_cost(0.416), "$0.42");
    }

    #[test]
    fn row_renders_costs_and_total() {
        let rendered = row("2026-10-19").render();
        assert_eq!(
            rendered,
            "| 2026-10-19 | — | $0.41 | — | — | $0.08 | **$0.49** | Research only |"
        );
    }

    #[test]
    fn notes_prefer_failures_over_version_change() {
        let change: ChangeReport =
            serde_json::from_value(json!({"newVersion": "2.5.0", "oldVersion": "2.4.0"}))
                .expect("change");
        let mut log = PipelineLog::for_date("2026-10-19");
        log.record("update", StageOutcome::Success);

        let row = CostRow::build("2026-10-19", &ledger(), None, Some(&change), Some(&log));
        assert_eq!(row.notes, "SDK v2.4.0→v2.5.0");

        log.record("verify", StageOutcome::Failure);
        log.record("mend", StageOutcome::Failure);
        let row = CostRow::build("2026-10-19", &ledger(), None, Some(&change), Some(&log));
        assert_eq!(row.notes, "Pipeline failed: mend, verify");
    }

    #[test]
    fn splice_is_idempotent_for_same_date() {
        let doc = readme(&[]);
        let once = splice_row(&doc, &row("2026-10-19")).expect("first");
        let twice = splice_row(&once, &row("2026-10-19")).expect("second");
        assert_eq!(once, twice);
        assert_eq!(data_rows(&twice).len(), 1);
    }

    #[test]
    fn splice_evicts_oldest_beyond_window() {
        let prior: Vec<String> = (11..=18)
            .rev()
            .map(|day| row(&format!("2026-10-{day}")).render())
            .collect();
        let doc = readme(&prior);
        let out = splice_row(&doc, &row("2026-10-19")).expect("splice");
        let rows = data_rows(&out);
        assert_eq!(rows.len(), WINDOW_ROWS);
        assert_eq!(row_date(rows[0]), Some("2026-10-19"));
        assert_eq!(row_date(rows[6]), Some("2026-10-13"));
        assert!(!out.contains("2026-10-12"));
        assert!(!out.contains("2026-10-11"));
    }

    #[test]
    fn splice_preserves_surrounding_content() {
        let doc = readme(&[row("2026-10-18").render()]);
        let out = splice_row(&doc, &row("2026-10-19")).expect("splice");
        assert!(out.starts_with(&format!("# Skill\n\n{SECTION_HEADER}\n\n{HEADER}\n{SEPARATOR}\n")));
        assert!(out.ends_with(&format!("\n\n{FOOTNOTE}\n\n## License\nMIT")));
    }

    #[test]
    fn splice_reports_missing_structure() {
        assert_eq!(
            splice_row("# Skill\n", &row("2026-10-19")),
            Err(TableError::SectionNotFound)
        );
        assert_eq!(
            splice_row(&format!("{SECTION_HEADER}\n\nno table\n"), &row("2026-10-19")),
            Err(TableError::HeaderRowNotFound)
        );
        let no_footnote = format!("{SECTION_HEADER}\n{HEADER}\n{SEPARATOR}\n");
        assert_eq!(
            splice_row(&no_footnote, &row("2026-10-19")),
            Err(TableError::FootnoteNotFound)
        );
    }
}
