//! Checkpointing with bounded retries.
//!
//! How each checkpoint-store failure is handled:
//! - **Ownership lost**: stop at once. Another worker owns the shard and
//!   retrying would only hide the handoff.
//! - **Throttled**: back off and retry until the attempt budget runs out,
//!   then give up for this interval. The next successful checkpoint still
//!   moves the cursor forward.
//! - **Storage failure**: stop at once and report for alerting; the store
//!   itself is unhealthy.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::CheckpointError;
use crate::retry::{RetryDecision, RetryOutcome, RetryPolicy, retry_bounded};
use crate::timer::Timer;

/// Durable progress marker for one shard, provided by the lease coordinator.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Records the last record handed to the processor as processed.
    async fn checkpoint(&self) -> Result<(), CheckpointError>;
}

/// Result of one checkpoint run (all attempts included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Committed { attempts: u32 },
    /// The lease moved to another worker; nothing was retried.
    OwnershipLost,
    /// Every attempt was throttled.
    GaveUp { attempts: u32 },
    /// The checkpoint store reported a persistent failure.
    StorageFailure { reason: String },
    /// Process shutdown cut a backoff short.
    Interrupted { attempts: u32 },
}

impl CheckpointOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CheckpointOutcome::Committed { .. })
    }
}

/// Maps a checkpoint-store failure to a retry decision.
pub fn classify_checkpoint_error(err: &CheckpointError) -> RetryDecision {
    match err {
        CheckpointError::OwnershipLost(_) => RetryDecision::StopSilently,
        CheckpointError::Throttled(_) => RetryDecision::Retry,
        CheckpointError::StorageFailure(_) => RetryDecision::StopAndReport,
    }
}

/// Checkpoints `shard_id` through `checkpointer`, retrying throttling.
pub async fn checkpoint_with_retries(
    shard_id: &str,
    checkpointer: &dyn Checkpointer,
    policy: &RetryPolicy,
    timer: &dyn Timer,
) -> CheckpointOutcome {
    info!("checkpointing shard {shard_id}");
    let max_attempts = policy.max_attempts;

    let outcome = retry_bounded(
        policy,
        timer,
        move |attempt| async move {
            let result = checkpointer.checkpoint().await;
            if let Err(CheckpointError::Throttled(reason)) = &result {
                if attempt < max_attempts {
                    info!(
                        "transient issue checkpointing shard {shard_id} - attempt {attempt} of {max_attempts}: {reason}"
                    );
                }
            }
            result
        },
        classify_checkpoint_error,
    )
    .await;

    match outcome {
        RetryOutcome::Succeeded { attempts, .. } => {
            info!("checkpointed shard {shard_id} after {attempts} attempt(s)");
            CheckpointOutcome::Committed { attempts }
        }
        RetryOutcome::StoppedSilently { error, .. } => {
            info!("skipping checkpoint for shard {shard_id}: {error}");
            CheckpointOutcome::OwnershipLost
        }
        RetryOutcome::StoppedWithReport { error, .. } => {
            error!(
                shard_id,
                alert = true,
                "cannot save checkpoint for shard {shard_id}; checkpoint store needs attention: {error}"
            );
            CheckpointOutcome::StorageFailure {
                reason: error.to_string(),
            }
        }
        RetryOutcome::Exhausted { error, attempts } => {
            error!("checkpoint for shard {shard_id} failed after {attempts} attempts: {error}");
            CheckpointOutcome::GaveUp { attempts }
        }
        RetryOutcome::Interrupted { error, attempts } => {
            warn!(
                "checkpoint for shard {shard_id} interrupted by shutdown after {attempts} attempt(s): {error}"
            );
            CheckpointOutcome::Interrupted { attempts }
        }
    }
}
