//! Batch progress reporting.

use serde::Serialize;

/// Aggregate counts of a batch run, published after every `(user, month)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Pairs recomputed and marked processed.
    pub processed: u64,
    /// Processed pairs where at least one track was upgraded.
    pub updated: u64,
    /// Pairs that failed and were left unprocessed.
    pub errored: u64,
    /// Pairs already marked processed by an earlier run.
    pub skipped: u64,
    /// Pairs in scope.
    pub total: u64,
}

impl BatchProgress {
    /// Pairs handled so far, whatever the result.
    pub fn handled(&self) -> u64 {
        self.processed + self.errored + self.skipped
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.handled())
    }

    /// Completion in percent; 100 for an empty run.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.handled() as f64 * 100.0 / self.total as f64
        }
    }
}

/// Final result of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub progress: BatchProgress,
    /// The run stopped early on request.
    pub cancelled: bool,
}
