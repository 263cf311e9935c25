//! Encrypting producer and test-load generator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::encryptor::EnvelopeEncryptor;
use crate::error::StreamResult;
use crate::timer::{Timer, wait_for_shutdown};
use crate::transport::RecordTransport;
use crate::types::PutRecordOutput;

/// Seals payloads and puts them onto the stream.
pub struct Producer {
    encryptor: Arc<EnvelopeEncryptor>,
    transport: Arc<dyn RecordTransport>,
}

impl Producer {
    pub fn new(encryptor: Arc<EnvelopeEncryptor>, transport: Arc<dyn RecordTransport>) -> Self {
        Self {
            encryptor,
            transport,
        }
    }

    pub fn encryptor(&self) -> &Arc<EnvelopeEncryptor> {
        &self.encryptor
    }

    /// Encrypts `payload`, encodes the wire record and puts it.
    pub async fn send(&self, partition_key: &str, payload: &[u8]) -> StreamResult<PutRecordOutput> {
        let body = self.encryptor.encrypt(payload).await?.to_bytes()?;
        let size = body.len();

        let output = self.transport.put_record(partition_key, body).await?;
        info!(
            "put record of {size} bytes with partition key {partition_key} to shard {} (seq {})",
            output.shard_id, output.sequence_number
        );
        Ok(output)
    }

    /// Sends one generated record every `pace` until shutdown is signalled.
    ///
    /// Waits for the transport to report the stream ready first; that wait
    /// failing is the only error. Failed sends are logged and the loop
    /// carries on. Returns the number of records put successfully.
    pub async fn run_generator(
        &self,
        timer: &dyn Timer,
        shutdown: watch::Receiver<bool>,
        pace: Duration,
    ) -> StreamResult<u64> {
        self.transport.wait_until_ready(timer).await?;

        let mut ticker = tokio::time::interval(pace.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let stop = wait_for_shutdown(shutdown);
        tokio::pin!(stop);

        let mut sent = 0u64;
        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("record generator stopping after {sent} records");
                    return Ok(sent);
                }
                _ = ticker.tick() => {
                    let (partition_key, payload) = generated_record(chrono::Utc::now().timestamp_millis());
                    match self.send(&partition_key, payload.as_bytes()).await {
                        Ok(_) => sent += 1,
                        Err(e) => warn!("failed to put generated record {partition_key}: {e}"),
                    }
                }
            }
        }
    }
}

/// Partition key and payload for the generator at `millis` since the epoch.
pub fn generated_record(millis: i64) -> (String, String) {
    (format!("partitionKey-{millis}"), format!("testData-{millis}"))
}
