//! Read-merge-write of the cost ledger file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::ledger::{CostLedger, LedgerEntry};
use crate::io::artifacts::{ArtifactSchema, load_optional, write_json_atomic};

const LABEL: &str = "cost ledger";

/// Load the ledger, or `None` when it is absent or unreadable.
pub fn load_ledger(path: &Path) -> Option<CostLedger> {
    load_optional(path, LABEL, ArtifactSchema::CostLedger).map(|loaded| loaded.value)
}

/// Replace `key` in the ledger at `path`, keeping every other key.
///
/// A missing or corrupt ledger is treated as empty.
#[instrument(skip_all, fields(path = %path.display(), key))]
pub fn merge_entry(path: &Path, key: &str, entry: &LedgerEntry) -> Result<CostLedger> {
    let mut ledger = load_ledger(path).unwrap_or_default();
    debug!(existing_keys = ledger.len(), "merging ledger entry");
    ledger.record(key, entry);
    write_json_atomic(path, &ledger).with_context(|| format!("write {LABEL}"))?;
    info!(key, cost_usd = entry.cost_usd, turns = ?entry.turns, "cost recorded");
    Ok(ledger)
}

/// Start a new run cycle with an empty ledger.
pub fn reset_ledger(path: &Path) -> Result<()> {
    debug!(path = %path.display(), "resetting cost ledger");
    write_json_atomic(path, &CostLedger::default()).with_context(|| format!("reset {LABEL}"))
}
