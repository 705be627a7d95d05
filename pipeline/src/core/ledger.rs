//! Cost ledger shared by all stages of one run cycle.
//!
//! The ledger is a JSON object keyed by stage. A stage only ever replaces its
//! own key; every other key, including ones this crate does not understand, is
//! carried through a read-merge-write untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::types::{EngineRun, ResearchTrack, Stage};

/// One stage's spend for the current run cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<u32>,
    /// Only the report stage stamps its entry with the report date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl LedgerEntry {
    pub fn from_run(run: &EngineRun) -> Self {
        Self {
            cost_usd: run.cost_usd,
            turns: Some(run.turns),
            date: None,
        }
    }

    pub fn with_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostLedger {
    entries: BTreeMap<String, Value>,
}

impl CostLedger {
    /// Replace `key` with `entry`. Other keys are left as they are.
    pub fn record(&mut self, key: &str, entry: &LedgerEntry) {
        let value = serde_json::to_value(entry).unwrap_or(Value::Null);
        if self.entries.insert(key.to_string(), value).is_some() {
            debug!(key, "replaced existing ledger entry");
        }
    }

    /// Typed view of `key`, or `None` when absent or of a foreign shape.
    pub fn entry(&self, key: &str) -> Option<LedgerEntry> {
        let value = self.entries.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn cost(&self, key: &str) -> Option<f64> {
        self.entry(key).map(|entry| entry.cost_usd)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Per-column costs for the rolling cost table. Missing entries count as zero.
    pub fn breakdown(&self) -> CostBreakdown {
        let cost = |key: &str| self.cost(key).unwrap_or(0.0);
        CostBreakdown {
            update: cost(Stage::Update.key()),
            mend: cost(Stage::Mend.key()),
            research: ResearchTrack::ALL
                .iter()
                .map(|track| cost(track.ledger_key()))
                .sum(),
            report: cost(Stage::Report.key()),
        }
    }
}

/// Costs grouped the way the cost table presents them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostBreakdown {
    pub update: f64,
    pub mend: f64,
    /// Sum over every research track.
    pub research: f64,
    pub report: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.update + self.mend + self.research + self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(cost_usd: f64, turns: u32) -> LedgerEntry {
        LedgerEntry {
            cost_usd,
            turns: Some(turns),
            date: None,
        }
    }

    #[test]
    fn record_overwrites_without_accumulating() {
        let mut ledger = CostLedger::default();
        ledger.record("update", &entry(0.40, 12));
        ledger.record("update", &entry(0.25, 7));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entry("update"), Some(entry(0.25, 7)));
    }

    #[test]
    fn record_preserves_foreign_keys() {
        let mut ledger: CostLedger = serde_json::from_value(json!({
            "update": {"costUsd": 0.5, "turns": 10},
            "mending": [{"costUsd": 0.1, "turns": 3}]
        }))
        .expect("parse");
        ledger.record("mend", &entry(0.2, 4));

        let value = serde_json::to_value(&ledger).expect("serialize");
        assert_eq!(value["update"], json!({"costUsd": 0.5, "turns": 10}));
        assert_eq!(value["mending"], json!([{"costUsd": 0.1, "turns": 3}]));
        assert_eq!(value["mend"], json!({"costUsd": 0.2, "turns": 4}));
        assert_eq!(ledger.entry("mending"), None);
    }

    #[test]
    fn report_entry_serializes_with_date() {
        let mut ledger = CostLedger::default();
        ledger.record("report", &entry(0.1, 3).with_date("2026-10-19"));
        let value = serde_json::to_value(&ledger).expect("serialize");
        assert_eq!(
            value["report"],
            json!({"costUsd": 0.1, "turns": 3, "date": "2026-10-19"})
        );
    }

    #[test]
    fn breakdown_sums_research_tracks_and_ignores_missing() {
        let mut ledger = CostLedger::default();
        ledger.record("update", &entry(1.0, 1));
        ledger.record("research_ts", &entry(0.5, 1));
        ledger.record("research_py", &entry(0.25, 1));
        let breakdown = ledger.breakdown();
        assert_eq!(breakdown.mend, 0.0);
        assert_eq!(breakdown.research, 0.75);
        assert_eq!(breakdown.total(), 1.75);
    }
}
