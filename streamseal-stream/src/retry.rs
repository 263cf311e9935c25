//! Bounded retry with fixed backoff.
//!
//! One driver serves both record processing and checkpointing. Callers pass
//! the operation and a classifier that maps each failure to a
//! [`RetryDecision`]; the driver owns the attempt counting and the sleeps.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::timer::{SleepOutcome, Timer};

/// Attempt budget and delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy; `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(3_000))
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back off and try again while attempts remain.
    Retry,
    /// Stop now; the failure is expected and needs no report.
    StopSilently,
    /// Stop now; the failure must be reported.
    StopAndReport,
}

/// Final result of a bounded retry run.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    StoppedSilently { error: E, attempts: u32 },
    StoppedWithReport { error: E, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { error: E, attempts: u32 },
    /// A backoff sleep was cut short by process shutdown.
    Interrupted { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::StoppedSilently { attempts, .. }
            | RetryOutcome::StoppedWithReport { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Interrupted { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Runs `operation` up to `policy.max_attempts` times.
///
/// `operation` receives the 1-based attempt number. Backoff happens only
/// between attempts, never after the last one.
pub async fn retry_bounded<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    timer: &dyn Timer,
    mut operation: F,
    classify: C,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        match classify(&error) {
            RetryDecision::StopSilently => {
                return RetryOutcome::StoppedSilently {
                    error,
                    attempts: attempt,
                };
            }
            RetryDecision::StopAndReport => {
                return RetryOutcome::StoppedWithReport {
                    error,
                    attempts: attempt,
                };
            }
            RetryDecision::Retry if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    error,
                    attempts: attempt,
                };
            }
            RetryDecision::Retry => {}
        }

        debug!(
            "attempt {attempt}/{max_attempts} failed, backing off {:?}",
            policy.backoff
        );
        if timer.sleep(policy.backoff).await == SleepOutcome::Interrupted {
            return RetryOutcome::Interrupted {
                error,
                attempts: attempt,
            };
        }
        attempt += 1;
    }
}
