//! The engine-backed stages, one module each.

pub mod mend;
pub mod report;
pub mod research;
pub mod update;

pub use mend::run_mend;
pub use report::run_report;
pub use research::{ResearchReport, run_research};
pub use update::run_update;
