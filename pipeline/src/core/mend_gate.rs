//! Two-state gate deciding whether the mend stage has work to do.

use crate::core::artifacts::VerifyReport;

/// Why the gate is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanReason {
    /// No verify report exists (verification has not run yet).
    NoVerifyReport,
    /// The verify report lists zero failed checks.
    AllChecksPassed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MendGate {
    /// Terminal: nothing to mend.
    Clean(CleanReason),
    /// One repair attempt is required.
    NeedsMend { checks_failed: u64 },
}

impl MendGate {
    pub fn evaluate(verify: Option<&VerifyReport>) -> Self {
        match verify {
            None => MendGate::Clean(CleanReason::NoVerifyReport),
            Some(report) if report.checks_failed == 0 => {
                MendGate::Clean(CleanReason::AllChecksPassed)
            }
            Some(report) => MendGate::NeedsMend {
                checks_failed: report.checks_failed,
            },
        }
    }

    pub fn needs_mend(self) -> bool {
        matches!(self, MendGate::NeedsMend { .. })
    }
}
