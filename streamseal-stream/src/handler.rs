//! Domain handling for decrypted records.

use async_trait::async_trait;
use tracing::info;

use crate::types::StreamRecord;

/// Receives each record's decrypted payload.
///
/// An `Err` is treated as transient: the shard processor retries the whole
/// record (decode, decrypt, handle) within its attempt budget.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(
        &self,
        shard_id: &str,
        record: &StreamRecord,
        plaintext: &[u8],
    ) -> anyhow::Result<()>;
}

/// Logs every decrypted payload and accepts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl RecordHandler for LoggingHandler {
    async fn handle(
        &self,
        shard_id: &str,
        record: &StreamRecord,
        plaintext: &[u8],
    ) -> anyhow::Result<()> {
        info!(
            "{shard_id}: {}, {}, decrypted data: {}",
            record.sequence_number,
            record.partition_key,
            String::from_utf8_lossy(plaintext)
        );
        Ok(())
    }
}
