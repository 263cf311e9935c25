//! Shared types for producing and consuming stream records.

use serde::{Deserialize, Serialize};

/// A record as delivered by the stream transport to a shard processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub sequence_number: String,
    pub partition_key: String,
    /// Encoded wire record (`{"key": ..., "data": ...}`).
    pub data: Vec<u8>,
}

impl StreamRecord {
    pub fn new(
        sequence_number: impl Into<String>,
        partition_key: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            partition_key: partition_key.into(),
            data,
        }
    }
}

/// Result of a successful put against the stream transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutRecordOutput {
    pub shard_id: String,
    pub sequence_number: String,
}

/// Why the lease coordinator is shutting a shard processor down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// The shard was fully consumed (e.g. resharding); child shards wait on
    /// our final checkpoint.
    GracefulHandoff,
    /// Another worker took the lease; checkpointing would be rejected.
    LeaseLost,
}

/// Where a consumer with no checkpoint starts reading a shard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitialPosition {
    /// Only records written after the consumer starts.
    #[default]
    Latest,
    /// The oldest record still retained by the stream.
    TrimHorizon,
}
