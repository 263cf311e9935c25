//! Stream error types.

use thiserror::Error;

use crate::shard_processor::ShardState;

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while producing or consuming encrypted records.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("key service error: {0}")]
    KeyService(String),

    #[error("cipher error: {0}")]
    Cipher(#[from] streamseal_crypto::CryptoError),

    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid shard processor state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: ShardState,
        actual: ShardState,
    },

    #[error("record handler failed: {0}")]
    Handler(anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Returns true for failures a later attempt may get past.
    ///
    /// Malformed records and cipher failures are deterministic for a given
    /// record, so retrying them cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StreamError::KeyService(_) | StreamError::Handler(_))
    }
}

/// Failures reported by the external checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    /// Another worker holds the shard lease.
    #[error("shard ownership lost: {0}")]
    OwnershipLost(String),

    /// Transient backpressure from the checkpoint store.
    #[error("checkpoint store throttled: {0}")]
    Throttled(String),

    /// Persistent checkpoint-store problem (missing table, bad capacity, ...).
    #[error("checkpoint storage failure: {0}")]
    StorageFailure(String),
}

impl CheckpointError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckpointError::Throttled(_))
    }
}
