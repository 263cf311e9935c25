//! Per-shard consumer lifecycle.
//!
//! The lease coordinator drives one [`ShardProcessor`] per assigned shard:
//!
//! ```text
//! Uninitialized --initialize--> Active --shutdown--> ShuttingDown --> Terminated
//!                                 |  ^
//!                                 +--+ process_batch
//! ```
//!
//! Calls on one processor are sequential. Independent processors run
//! concurrently and share only the key manager, the record handler and
//! read-only policy.
//!
//! A batch cut short by process shutdown halts the processor: later batches
//! are refused and no checkpoint is taken until `shutdown`, so the records
//! left unprocessed are redelivered from the last committed position.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointOutcome, Checkpointer, checkpoint_with_retries};
use crate::config::StreamConfig;
use crate::decryptor::EnvelopeDecryptor;
use crate::error::{StreamError, StreamResult};
use crate::handler::RecordHandler;
use crate::key_manager::KeyManager;
use crate::retry::{RetryDecision, RetryOutcome, RetryPolicy, retry_bounded};
use crate::timer::Timer;
use crate::types::{InitialPosition, ShutdownReason, StreamRecord};

/// Lifecycle state of a shard processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    Uninitialized,
    Active,
    ShuttingDown,
    Terminated,
}

/// Retry and checkpoint policy for shard processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorPolicy {
    pub record_retry: RetryPolicy,
    pub checkpoint_retry: RetryPolicy,
    pub checkpoint_interval: Duration,
}

impl Default for ProcessorPolicy {
    fn default() -> Self {
        Self {
            record_retry: RetryPolicy::default(),
            checkpoint_retry: RetryPolicy::default(),
            checkpoint_interval: Duration::from_millis(60_000),
        }
    }
}

impl ProcessorPolicy {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            record_retry: config.retry_policy(),
            checkpoint_retry: config.retry_policy(),
            checkpoint_interval: config.checkpoint_interval(),
        }
    }
}

/// Checkpoint bookkeeping for one shard.
#[derive(Debug, Clone)]
pub struct ShardCursor {
    shard_id: String,
    last_checkpoint: Option<Instant>,
    checkpoint_interval: Duration,
}

impl ShardCursor {
    pub fn new(shard_id: impl Into<String>, checkpoint_interval: Duration) -> Self {
        Self {
            shard_id: shard_id.into(),
            last_checkpoint: None,
            checkpoint_interval,
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    /// Time of the last successful checkpoint.
    pub fn last_checkpoint(&self) -> Option<Instant> {
        self.last_checkpoint
    }

    pub fn checkpoint_interval(&self) -> Duration {
        self.checkpoint_interval
    }

    /// True if no checkpoint has succeeded yet or the interval has passed.
    pub fn checkpoint_due(&self, now: Instant) -> bool {
        match self.last_checkpoint {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.checkpoint_interval,
        }
    }

    /// Records a successful checkpoint. Never moves backwards.
    fn record_checkpoint(&mut self, at: Instant) {
        self.last_checkpoint = Some(match self.last_checkpoint {
            Some(last) if last > at => last,
            _ => at,
        });
    }
}

/// Summary of one `process_batch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub processed: usize,
    pub skipped: usize,
    /// Shutdown cut a backoff short; the rest of the batch was left
    /// unprocessed and no checkpoint was taken.
    pub interrupted: bool,
    /// Present when a periodic checkpoint was attempted.
    pub checkpoint: Option<CheckpointOutcome>,
}

/// Maps a record-processing failure to a retry decision.
///
/// Key-service and handler failures may clear up; malformed records and
/// cipher failures will not.
pub fn classify_record_error(err: &StreamError) -> RetryDecision {
    if err.is_retryable() {
        RetryDecision::Retry
    } else {
        RetryDecision::StopAndReport
    }
}

enum RecordDisposition {
    Processed,
    Skipped,
    Interrupted,
}

struct ShardSession {
    cursor: ShardCursor,
    decryptor: EnvelopeDecryptor,
    /// Set once shutdown interrupted a batch.
    halted: bool,
}

/// Decrypts, handles and checkpoints the records of one shard.
pub struct ShardProcessor {
    key_manager: Arc<dyn KeyManager>,
    handler: Arc<dyn RecordHandler>,
    timer: Arc<dyn Timer>,
    policy: ProcessorPolicy,
    state: ShardState,
    session: Option<ShardSession>,
}

impl ShardProcessor {
    pub fn new(
        key_manager: Arc<dyn KeyManager>,
        handler: Arc<dyn RecordHandler>,
        timer: Arc<dyn Timer>,
        policy: ProcessorPolicy,
    ) -> Self {
        Self {
            key_manager,
            handler,
            timer,
            policy,
            state: ShardState::Uninitialized,
            session: None,
        }
    }

    pub fn state(&self) -> ShardState {
        self.state
    }

    pub fn policy(&self) -> &ProcessorPolicy {
        &self.policy
    }

    pub fn shard_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.cursor.shard_id())
    }

    pub fn cursor(&self) -> Option<&ShardCursor> {
        self.session.as_ref().map(|s| &s.cursor)
    }

    /// True once shutdown interrupted a batch on this shard.
    pub fn is_halted(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.halted)
    }

    /// Number of distinct data keys unwrapped for the current shard.
    pub async fn cached_keys(&self) -> usize {
        match &self.session {
            Some(session) => session.decryptor.cache().len().await,
            None => 0,
        }
    }

    /// Binds the processor to `shard_id` with a fresh key cache.
    pub fn initialize(&mut self, shard_id: impl Into<String>) -> StreamResult<()> {
        self.ensure_state(ShardState::Uninitialized)?;

        let cursor = ShardCursor::new(shard_id, self.policy.checkpoint_interval);
        info!("initializing record processor for shard {}", cursor.shard_id());

        self.session = Some(ShardSession {
            cursor,
            decryptor: EnvelopeDecryptor::new(Arc::clone(&self.key_manager)),
            halted: false,
        });
        self.state = ShardState::Active;
        Ok(())
    }

    /// Processes a delivered batch, then checkpoints if the interval passed.
    ///
    /// Individual records that cannot be processed are logged and skipped;
    /// checkpoint failures are logged and reported in the [`BatchReport`].
    /// A halted processor refuses the batch and reports it as interrupted.
    pub async fn process_batch(
        &mut self,
        records: &[StreamRecord],
        checkpointer: &dyn Checkpointer,
    ) -> StreamResult<BatchReport> {
        let session = self.active_session()?;
        let shard_id = session.cursor.shard_id();

        let mut report = BatchReport {
            received: records.len(),
            ..BatchReport::default()
        };

        if session.halted {
            warn!(
                "shard {shard_id} halted by shutdown, leaving {} records for redelivery: {}",
                records.len(),
                sequence_numbers(records)
            );
            report.interrupted = true;
            return Ok(report);
        }

        info!("processing {} records from {shard_id}", records.len());

        let mut unprocessed = None;
        for (index, record) in records.iter().enumerate() {
            match self.process_record(session, record).await {
                RecordDisposition::Processed => report.processed += 1,
                RecordDisposition::Skipped => report.skipped += 1,
                RecordDisposition::Interrupted => {
                    unprocessed = Some(&records[index..]);
                    break;
                }
            }
        }

        if let Some(pending) = unprocessed {
            warn!(
                "batch for shard {shard_id} interrupted by shutdown after {} of {} records; not checkpointing, unprocessed: {}",
                report.processed + report.skipped,
                report.received,
                sequence_numbers(pending)
            );
            report.interrupted = true;
            if let Some(session) = self.session.as_mut() {
                session.halted = true;
            }
            return Ok(report);
        }

        if !session.cursor.checkpoint_due(self.timer.now()) {
            return Ok(report);
        }

        if let Some(session) = self.session.as_mut() {
            let outcome = Self::run_checkpoint(
                session,
                checkpointer,
                &self.policy.checkpoint_retry,
                self.timer.as_ref(),
            )
            .await;
            report.checkpoint = Some(outcome);
        }

        Ok(report)
    }

    /// Ends the processor's ownership of its shard.
    ///
    /// A graceful handoff takes a final checkpoint so child shards can start;
    /// a lost lease skips it because the store would reject it. A halted
    /// processor skips it as well.
    pub async fn shutdown(
        &mut self,
        checkpointer: &dyn Checkpointer,
        reason: ShutdownReason,
    ) -> StreamResult<Option<CheckpointOutcome>> {
        self.ensure_state(ShardState::Active)?;
        self.state = ShardState::ShuttingDown;

        let outcome = match self.session.as_mut() {
            Some(session) => {
                info!(
                    "shutting down record processor for shard {} ({reason:?})",
                    session.cursor.shard_id()
                );
                match reason {
                    ShutdownReason::GracefulHandoff if session.halted => {
                        warn!(
                            "shard {} halted mid-batch, skipping final checkpoint",
                            session.cursor.shard_id()
                        );
                        None
                    }
                    ShutdownReason::GracefulHandoff => Some(
                        Self::run_checkpoint(
                            session,
                            checkpointer,
                            &self.policy.checkpoint_retry,
                            self.timer.as_ref(),
                        )
                        .await,
                    ),
                    ShutdownReason::LeaseLost => {
                        info!(
                            "lease for shard {} lost, skipping final checkpoint",
                            session.cursor.shard_id()
                        );
                        None
                    }
                }
            }
            None => None,
        };

        self.session = None;
        self.state = ShardState::Terminated;
        Ok(outcome)
    }

    async fn process_record(
        &self,
        session: &ShardSession,
        record: &StreamRecord,
    ) -> RecordDisposition {
        let shard_id = session.cursor.shard_id();
        let decryptor = &session.decryptor;
        let handler = self.handler.as_ref();
        let max_attempts = self.policy.record_retry.max_attempts;

        let outcome = retry_bounded(
            &self.policy.record_retry,
            self.timer.as_ref(),
            move |attempt| async move {
                let result = Self::process_once(decryptor, handler, shard_id, record).await;
                if let Err(e) = &result {
                    warn!(
                        shard_id,
                        sequence_number = %record.sequence_number,
                        attempt,
                        "failed to process record {} (attempt {attempt} of {max_attempts}): {e}",
                        record.sequence_number
                    );
                }
                result
            },
            classify_record_error,
        )
        .await;

        match outcome {
            RetryOutcome::Succeeded { .. } => RecordDisposition::Processed,
            RetryOutcome::StoppedSilently { error, attempts }
            | RetryOutcome::StoppedWithReport { error, attempts } => {
                error!(
                    "skipping unrecoverable record {} (partition key {}) from shard {shard_id} after {attempts} attempt(s): {error}",
                    record.sequence_number, record.partition_key
                );
                RecordDisposition::Skipped
            }
            RetryOutcome::Exhausted { error, attempts } => {
                error!(
                    "couldn't process record {} (partition key {}) from shard {shard_id} after {attempts} attempts, skipping: {error}",
                    record.sequence_number, record.partition_key
                );
                RecordDisposition::Skipped
            }
            RetryOutcome::Interrupted { error, attempts } => {
                warn!(
                    "processing of record {} from shard {shard_id} interrupted after {attempts} attempt(s): {error}",
                    record.sequence_number
                );
                RecordDisposition::Interrupted
            }
        }
    }

    async fn process_once(
        decryptor: &EnvelopeDecryptor,
        handler: &dyn RecordHandler,
        shard_id: &str,
        record: &StreamRecord,
    ) -> StreamResult<()> {
        let plaintext = decryptor.decrypt_bytes(&record.data).await?;
        handler
            .handle(shard_id, record, &plaintext)
            .await
            .map_err(StreamError::Handler)
    }

    async fn run_checkpoint(
        session: &mut ShardSession,
        checkpointer: &dyn Checkpointer,
        policy: &RetryPolicy,
        timer: &dyn Timer,
    ) -> CheckpointOutcome {
        let outcome =
            checkpoint_with_retries(session.cursor.shard_id(), checkpointer, policy, timer).await;
        if outcome.is_committed() {
            session.cursor.record_checkpoint(timer.now());
        }
        outcome
    }

    fn ensure_state(&self, expected: ShardState) -> StreamResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StreamError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn active_session(&self) -> StreamResult<&ShardSession> {
        self.ensure_state(ShardState::Active)?;
        self.session.as_ref().ok_or(StreamError::InvalidState {
            expected: ShardState::Active,
            actual: self.state,
        })
    }
}

fn sequence_numbers(records: &[StreamRecord]) -> String {
    records
        .iter()
        .map(|r| r.sequence_number.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Identity and start position the lease coordinator registers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseSettings {
    pub application_name: String,
    pub worker_id: String,
    pub initial_position: InitialPosition,
}

impl LeaseSettings {
    /// Takes the configured worker id, or generates one if none is set.
    pub fn from_config(config: &StreamConfig) -> Self {
        let mut config = config.clone();
        let worker_id = config.resolve_worker_id().to_string();
        Self {
            application_name: config.application_name,
            worker_id,
            initial_position: config.initial_position,
        }
    }
}

/// Creates shard processors for the lease coordinator.
///
/// Every processor shares the key manager, the record handler, the timer
/// and the policy; each gets its own key cache on `initialize`.
#[derive(Clone)]
pub struct ShardProcessorFactory {
    key_manager: Arc<dyn KeyManager>,
    handler: Arc<dyn RecordHandler>,
    timer: Arc<dyn Timer>,
    policy: ProcessorPolicy,
    lease: Option<LeaseSettings>,
}

impl ShardProcessorFactory {
    pub fn new(
        key_manager: Arc<dyn KeyManager>,
        handler: Arc<dyn RecordHandler>,
        timer: Arc<dyn Timer>,
        policy: ProcessorPolicy,
    ) -> Self {
        Self {
            key_manager,
            handler,
            timer,
            policy,
            lease: None,
        }
    }

    pub fn from_config(
        config: &StreamConfig,
        key_manager: Arc<dyn KeyManager>,
        handler: Arc<dyn RecordHandler>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        let lease = LeaseSettings::from_config(config);
        info!(
            "shard processors for application {} on stream {} (worker {}, initial position {:?})",
            lease.application_name, config.stream_name, lease.worker_id, lease.initial_position
        );

        Self {
            lease: Some(lease),
            ..Self::new(key_manager, handler, timer, ProcessorPolicy::from_config(config))
        }
    }

    /// Lease identity, when built from a [`StreamConfig`].
    pub fn lease(&self) -> Option<&LeaseSettings> {
        self.lease.as_ref()
    }

    pub fn create_processor(&self) -> ShardProcessor {
        ShardProcessor::new(
            Arc::clone(&self.key_manager),
            Arc::clone(&self.handler),
            Arc::clone(&self.timer),
            self.policy,
        )
    }
}
