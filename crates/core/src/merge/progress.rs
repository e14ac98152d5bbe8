//! Progress reporting hooks for the merge pipeline.

use std::fmt;

/// The two mutating passes of a merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Reconcile,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconcile => write!(f, "reconcile"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Receives one `advance` per processed entry, in processing order.
///
/// `completed` starts at 1 and reaches `total` on the last entry of a phase.
pub trait ProgressSink {
    fn begin(&self, _phase: Phase, _total: usize) {}

    fn advance(&self, phase: Phase, completed: usize, total: usize);

    fn finish(&self, _phase: Phase) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn advance(&self, _phase: Phase, _completed: usize, _total: usize) {}
}
