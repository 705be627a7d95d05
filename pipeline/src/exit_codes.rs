//! Stable exit codes for pipeline CLI commands.

/// Command succeeded, or a stage deliberately short-circuited.
pub const OK: i32 = 0;
/// Command failed for any reason other than a missing input (bad config, engine spawn failure).
pub const INVALID: i32 = 1;
/// A required input artifact was missing or unreadable.
pub const MISSING_INPUT: i32 = 2;
