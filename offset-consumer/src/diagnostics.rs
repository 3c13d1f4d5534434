use std::collections::VecDeque;
use std::fmt;

const RECENT_CAPACITY: usize = 32;

/// Where a swallowed failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PeriodicCommit,
    ManualCommit,
    FinalCommit,
    Close,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PeriodicCommit => "periodic_commit",
            FailureKind::ManualCommit => "manual_commit",
            FailureKind::FinalCommit => "final_commit",
            FailureKind::Close => "close",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonCriticalFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Failures that are logged and swallowed rather than propagated.
///
/// Keeps the most recent entries plus a running total, so the channel stays
/// bounded on a long-lived consumer.
#[derive(Debug, Default)]
pub struct Diagnostics {
    recent: VecDeque<NonCriticalFailure>,
    total: u64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: FailureKind, error: &dyn fmt::Display) {
        if self.recent.len() == RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(NonCriticalFailure {
            kind,
            message: error.to_string(),
        });
        self.total += 1;
    }

    pub fn recent(&self) -> impl Iterator<Item = &NonCriticalFailure> {
        self.recent.iter()
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.recent.iter().filter(|f| f.kind == kind).count()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
