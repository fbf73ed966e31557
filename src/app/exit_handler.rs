//! Exit code logic for the harvester process.
//!
//! Single responsibility: map run counts to the process exit outcome.

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Nothing failed in this run.
    Success,
    /// Some items failed or the run was interrupted, but work was done.
    Partial,
    /// Everything attempted failed, or the run could not start.
    Failure,
}

impl ProcessExit {
    pub(crate) fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

/// Determines the process exit outcome from succeeded, failed and interrupted
/// item counts.
pub(crate) fn determine_exit_outcome(
    succeeded: usize,
    failed: usize,
    interrupted: usize,
) -> ProcessExit {
    if failed == 0 && interrupted == 0 {
        ProcessExit::Success
    } else if succeeded > 0 || failed == 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
