use std::fmt;

/// Aggregate outcome of one run
///
/// `successful` counts every selected schema that ended up with a usable
/// artifact, reused ones included; `reused` is the part of it produced by
/// linking the previous generation's artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupResult {
    /// Schemas reported by the inventory
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Inventory schemas left out by the selection
    pub skipped: usize,
    pub reused: usize,
    /// The run was skipped on purpose (a skip condition matched)
    pub all_skipped_successfully: bool,
    /// The run was skipped because a precondition failed
    pub all_skipped_faulty: bool,
}

impl BackupResult {
    /// Result of a run skipped by a skip condition
    pub fn skipped_successfully() -> Self {
        Self {
            all_skipped_successfully: true,
            ..Self::default()
        }
    }

    /// Result of a run that never started because a precondition failed
    pub fn skipped_faulty() -> Self {
        Self {
            all_skipped_faulty: true,
            ..Self::default()
        }
    }

    /// Schemas that went through a fresh dump
    pub fn fresh_dumps(&self) -> usize {
        self.successful.saturating_sub(self.reused)
    }

    pub fn is_success(&self) -> bool {
        if self.all_skipped_faulty {
            return false;
        }
        !(self.total > 0 && self.successful == 0)
    }
}

impl fmt::Display for BackupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully dumped {} of {} databases. Reused {}, Skipped {}, Failed {}.",
            self.successful, self.total, self.reused, self.skipped, self.failed
        )
    }
}

/// What happened to one schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpOutcome {
    Dumped,
    Reused,
    Failed(String),
}

/// Lifecycle of one scheduler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    NotStarted,
    Admitted,
    Dispatching,
    AwaitingCompletion,
    Finalized,
    Aborted,
}
