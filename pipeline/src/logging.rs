//! Console tracing for pipeline runs.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: operator diagnostics via `RUST_LOG`, output to
//!   stderr. Not persisted.
//!
//! - **Artifacts (`io/artifacts`, `io/ledger_store`)**: the cost ledger,
//!   pipeline log and reports. Always written, unaffected by `RUST_LOG`.
//!
//! - **Transcripts (`io/engine`)**: raw engine event streams under the
//!   transcripts directory, one file per stage and day.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset, since stage
/// progress (cost, turns, report paths) is logged at that level.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=skill_pipeline=debug skill-pipeline run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
