//! Retry policy and backoff
//!
//! Per-task lifecycle:
//!
//! - `Ready -> InFlight -> Delivered` on success
//! - `InFlight -> Ready(attempt + 1)` on a transient failure, after a backoff
//! - `InFlight -> Ready(attempt + 1)` with a session-rotation hint when the
//!   page looked like a block or challenge
//! - `InFlight -> Abandoned` once `max_attempts` is reached, or immediately
//!   for pages that are gone

use crate::config::{BackoffConfig, BackoffStrategy};
use crate::crawler::task::{FailureKind, Task};
use std::time::Duration;

/// Computes the delay before a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub strategy: BackoffStrategy,
    pub max: Duration,
}

impl Backoff {
    /// Delay before retrying after `failures` failed attempts (1-based)
    ///
    /// * fixed: `base`
    /// * linear: `base * failures`
    /// * exponential: `base * 2^(failures - 1)`
    ///
    /// Always capped at `max`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let n = failures.max(1);
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base,
            BackoffStrategy::Linear => self.base.saturating_mul(n),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
                self.base.saturating_mul(factor)
            }
        };
        delay.min(self.max)
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            strategy: config.strategy,
            max: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// What to do with a task after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then return the task to the ready queue
    Retry {
        delay: Duration,
        rotate_session: bool,
    },
    /// Stop and report the task as failed
    Abandon,
}

/// Decides between retry and abandonment
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Decides the next step for `task` after an attempt failed with `kind`
    ///
    /// `task.attempt` counts failures before this one.
    pub fn decide(&self, task: &Task, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Gone {
            return RetryDecision::Abandon;
        }

        let failures = task.attempt.saturating_add(1);
        if failures >= self.max_attempts {
            return RetryDecision::Abandon;
        }

        RetryDecision::Retry {
            delay: self.backoff.delay_for(failures),
            rotate_session: matches!(kind, FailureKind::Blocked | FailureKind::Classification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::normalize_url;

    fn backoff(strategy: BackoffStrategy) -> Backoff {
        Backoff {
            base: Duration::from_millis(1000),
            strategy,
            max: Duration::from_millis(5000),
        }
    }

    fn task_with_attempts(attempt: u32) -> Task {
        let mut task = Task::search(normalize_url("https://x/search").unwrap());
        task.attempt = attempt;
        task
    }

    #[test]
    fn test_fixed_backoff() {
        let b = backoff(BackoffStrategy::Fixed);
        assert_eq!(b.delay_for(1), Duration::from_millis(1000));
        assert_eq!(b.delay_for(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_linear_backoff() {
        let b = backoff(BackoffStrategy::Linear);
        assert_eq!(b.delay_for(1), Duration::from_millis(1000));
        assert_eq!(b.delay_for(3), Duration::from_millis(3000));
        assert_eq!(b.delay_for(9), Duration::from_millis(5000));
    }

    #[test]
    fn test_exponential_backoff() {
        let b = backoff(BackoffStrategy::Exponential);
        assert_eq!(b.delay_for(1), Duration::from_millis(1000));
        assert_eq!(b.delay_for(2), Duration::from_millis(2000));
        assert_eq!(b.delay_for(3), Duration::from_millis(4000));
        assert_eq!(b.delay_for(4), Duration::from_millis(5000));
        assert_eq!(b.delay_for(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_retry_until_max_attempts() {
        let policy = RetryPolicy::new(3, backoff(BackoffStrategy::Fixed));

        assert!(matches!(
            policy.decide(&task_with_attempts(0), FailureKind::Network),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(&task_with_attempts(1), FailureKind::Timeout),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(
            policy.decide(&task_with_attempts(2), FailureKind::Network),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::new(1, backoff(BackoffStrategy::Fixed));
        assert_eq!(
            policy.decide(&task_with_attempts(0), FailureKind::Network),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_gone_abandons_immediately() {
        let policy = RetryPolicy::new(5, backoff(BackoffStrategy::Fixed));
        assert_eq!(
            policy.decide(&task_with_attempts(0), FailureKind::Gone),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_rotation_hint_for_blocks_and_challenges() {
        let policy = RetryPolicy::new(5, backoff(BackoffStrategy::Fixed));
        let task = task_with_attempts(0);

        for (kind, rotate) in [
            (FailureKind::Blocked, true),
            (FailureKind::Classification, true),
            (FailureKind::Network, false),
            (FailureKind::Timeout, false),
            (FailureKind::Sink, false),
        ] {
            match policy.decide(&task, kind) {
                RetryDecision::Retry { rotate_session, .. } => {
                    assert_eq!(rotate_session, rotate, "{:?}", kind)
                }
                RetryDecision::Abandon => panic!("{:?} should retry", kind),
            }
        }
    }
}
