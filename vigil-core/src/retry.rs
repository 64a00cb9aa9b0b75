//! Per-attempt bookkeeping for the persistence pipeline.

use crate::error::StoreError;
use std::time::Duration;

/// How one attempt settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Error(StoreError),
    TimedOut,
}

/// One try of a remote write. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub ordinal: u32,
    /// Budget the write was raced against
    pub timeout: Duration,
    pub outcome: AttemptOutcome,
    /// Delay slept before the next attempt, if there was one
    pub backoff: Option<Duration>,
}

impl RetryAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }

    /// The error this attempt produced, with timeouts expressed as
    /// [`StoreError::Timeout`].
    pub fn error(&self) -> Option<StoreError> {
        match &self.outcome {
            AttemptOutcome::Success => None,
            AttemptOutcome::Error(err) => Some(err.clone()),
            AttemptOutcome::TimedOut => Some(StoreError::Timeout {
                after: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_attempt_reports_timeout_error() {
        let attempt = RetryAttempt {
            ordinal: 1,
            timeout: Duration::from_secs(20),
            outcome: AttemptOutcome::TimedOut,
            backoff: Some(Duration::from_secs(1)),
        };
        assert!(!attempt.succeeded());
        assert_eq!(
            attempt.error(),
            Some(StoreError::Timeout {
                after: Duration::from_secs(20)
            })
        );
    }

    #[test]
    fn test_successful_attempt_has_no_error() {
        let attempt = RetryAttempt {
            ordinal: 3,
            timeout: Duration::from_secs(40),
            outcome: AttemptOutcome::Success,
            backoff: None,
        };
        assert!(attempt.succeeded());
        assert!(attempt.error().is_none());
    }
}
