/// Task state definitions for tracking crawl progress
///
/// Every canonical URL the frontier has seen is in exactly one of these
/// states.
use std::fmt;

/// Represents the current state of a task in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Live States =====
    /// Task is queued and waiting to be fetched
    Ready,

    /// Task has been handed to a worker
    InFlight,

    // ===== Terminal States =====
    /// Page was processed and its output handed to the sink
    Delivered,

    /// Task exhausted its attempts (or failed permanently) and was reported
    Abandoned,
}

impl TaskState {
    /// Returns true if a task in this state counts against the one-live-task
    /// per URL rule
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Ready | Self::InFlight)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    ///
    /// `InFlight -> Ready` is the retry (or interrupted) path and
    /// `Abandoned -> Ready` is the explicit recreate path with a fresh
    /// attempt count. A URL is only ever delivered from flight; a summary
    /// card claimed without a fetch starts out `Delivered` instead.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Ready, Self::InFlight)
                | (Self::InFlight, Self::Ready)
                | (Self::InFlight, Self::Delivered)
                | (Self::InFlight, Self::Abandoned)
                | (Self::Abandoned, Self::Ready)
        )
    }

    /// Converts the task state to its log representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::InFlight => "in_flight",
            Self::Delivered => "delivered",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
