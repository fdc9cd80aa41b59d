//! Retry policy for dispatched posts
//!
//! Turns the aggregate outcome of one dispatch attempt into the next state of
//! the post. The policy is a pure function of the outcome, the post's retry
//! count and the current time, so it can be exercised without a store or a
//! network.

use crate::config::SchedulerConfig;
use crate::dispatch::AggregateOutcome;
use crate::types::PostStatus;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// State change to apply to a pending post after a dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// At least one platform delivered
    Posted { error_message: Option<String> },
    /// Every platform failed; stay pending and try again later
    Retry {
        retry_count: u32,
        error_message: String,
        next_attempt_at: Option<i64>,
    },
    /// Every platform failed and no retries remain
    Failed { error_message: String },
}

impl Transition {
    pub fn status(&self) -> PostStatus {
        match self {
            Transition::Posted { .. } => PostStatus::Posted,
            Transition::Retry { .. } => PostStatus::Pending,
            Transition::Failed { .. } => PostStatus::Failed,
        }
    }

    /// Retry count to persist, given the count observed before dispatch
    pub fn retry_count(&self, current: u32) -> u32 {
        match self {
            Transition::Retry { retry_count, .. } => *retry_count,
            Transition::Posted { .. } | Transition::Failed { .. } => current,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Transition::Posted { error_message } => error_message.as_deref(),
            Transition::Retry { error_message, .. } | Transition::Failed { error_message } => {
                Some(error_message)
            }
        }
    }

    pub fn next_attempt_at(&self) -> Option<i64> {
        match self {
            Transition::Retry {
                next_attempt_at, ..
            } => *next_attempt_at,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    retry_delay_secs: u64,
    max_retry_delay_secs: u64,
    fail_fast_on_invalid_input: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// Policy that retries on the next tick, with no backoff
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay_secs: 0,
            max_retry_delay_secs: 0,
            fail_fast_on_invalid_input: false,
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.max_retries)
            .with_backoff(config.retry_delay_secs, config.max_retry_delay_secs)
            .with_fail_fast(config.fail_fast_on_invalid_input)
    }

    /// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`
    pub fn with_backoff(mut self, base_secs: u64, max_secs: u64) -> Self {
        self.retry_delay_secs = base_secs;
        self.max_retry_delay_secs = max_secs.max(base_secs);
        self
    }

    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast_on_invalid_input = enabled;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        if self.retry_delay_secs == 0 {
            return 0;
        }
        let exp = attempt.max(1) - 1;
        let multiplier = 1_u64.checked_shl(exp).unwrap_or(u64::MAX);
        self.retry_delay_secs
            .saturating_mul(multiplier)
            .min(self.max_retry_delay_secs)
    }

    pub fn decide(&self, outcome: &AggregateOutcome, retry_count: u32, now: i64) -> Transition {
        match outcome {
            AggregateOutcome::Success => Transition::Posted {
                error_message: None,
            },
            AggregateOutcome::PartialSuccess { errors } => Transition::Posted {
                error_message: Some(format!("Partially posted. Errors: {}", errors)),
            },
            AggregateOutcome::TotalFailure { errors, retryable } => {
                if !retryable && self.fail_fast_on_invalid_input {
                    return Transition::Failed {
                        error_message: format!("Non-retryable failure. Errors: {}", errors),
                    };
                }

                if retry_count >= self.max_retries {
                    return Transition::Failed {
                        error_message: format!("Max retries reached. Errors: {}", errors),
                    };
                }

                let attempt = retry_count + 1;
                let delay = self.backoff_secs(attempt);
                Transition::Retry {
                    retry_count: attempt,
                    error_message: format!(
                        "Retry {}/{}. Errors: {}",
                        attempt, self.max_retries, errors
                    ),
                    next_attempt_at: (delay > 0)
                        .then(|| now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX))),
                }
            }
        }
    }
}
