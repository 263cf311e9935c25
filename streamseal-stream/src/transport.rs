//! Stream transport for encoded records.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_kinesis::Client as KinesisClient;
use aws_sdk_kinesis::primitives::Blob;
use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::kms::load_sdk_config;
use crate::timer::{SleepOutcome, Timer};
use crate::types::PutRecordOutput;

/// Delay between stream status checks.
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// How long to wait for a stream to become active.
pub const STREAM_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// Puts one encoded record onto the stream.
#[async_trait]
pub trait RecordTransport: Send + Sync {
    async fn put_record(&self, partition_key: &str, body: Vec<u8>) -> StreamResult<PutRecordOutput>;

    /// Resolves once the stream accepts records.
    async fn wait_until_ready(&self, _timer: &dyn Timer) -> StreamResult<()> {
        Ok(())
    }
}

/// What a stream status means for a producer about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamReadiness {
    Active,
    /// Creating or updating; poll again.
    Pending,
    Deleting,
}

/// Classifies a Kinesis stream status string (`ACTIVE`, `CREATING`, ...).
///
/// Unknown statuses are treated as pending.
pub fn classify_stream_status(status: &str) -> StreamReadiness {
    match status {
        "ACTIVE" => StreamReadiness::Active,
        "DELETING" => StreamReadiness::Deleting,
        _ => StreamReadiness::Pending,
    }
}

/// Polls `describe` until the stream is active.
///
/// Fails with [`StreamError::Transport`] when the stream is being deleted,
/// when `timeout` passes, or when shutdown interrupts the wait.
pub async fn wait_for_active_stream<F, Fut>(
    stream_name: &str,
    timer: &dyn Timer,
    poll_interval: Duration,
    timeout: Duration,
    mut describe: F,
) -> StreamResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StreamResult<String>>,
{
    let deadline = timer.now() + timeout;

    loop {
        let status = describe().await?;
        match classify_stream_status(&status) {
            StreamReadiness::Active => {
                info!("stream {stream_name} is active");
                return Ok(());
            }
            StreamReadiness::Deleting => {
                return Err(StreamError::Transport(format!(
                    "stream {stream_name} is being deleted"
                )));
            }
            StreamReadiness::Pending => {}
        }

        if timer.now() >= deadline {
            return Err(StreamError::Transport(format!(
                "stream {stream_name} still {status} after {timeout:?}"
            )));
        }

        info!("stream {stream_name} is {status}, checking again in {poll_interval:?}");
        if timer.sleep(poll_interval).await == SleepOutcome::Interrupted {
            return Err(StreamError::Transport(format!(
                "wait for stream {stream_name} interrupted by shutdown"
            )));
        }
    }
}

/// [`RecordTransport`] backed by a Kinesis data stream.
pub struct KinesisTransport {
    client: KinesisClient,
    stream_name: String,
}

impl KinesisTransport {
    pub fn new(client: KinesisClient, stream_name: impl Into<String>) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
        }
    }

    /// Builds a client for the configured region, endpoint and stream.
    pub async fn from_config(config: &StreamConfig) -> Self {
        let sdk_config =
            load_sdk_config(&config.region, config.endpoint_override.as_deref()).await;
        Self::new(KinesisClient::new(&sdk_config), config.stream_name.clone())
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Current stream status as reported by `DescribeStreamSummary`.
    pub async fn stream_status(&self) -> StreamResult<String> {
        let resp = self
            .client
            .describe_stream_summary()
            .stream_name(&self.stream_name)
            .send()
            .await
            .map_err(|e| {
                StreamError::Transport(format!(
                    "DescribeStreamSummary for {} failed: {e}",
                    self.stream_name
                ))
            })?;

        resp.stream_description_summary()
            .map(|summary| summary.stream_status().as_str().to_string())
            .ok_or_else(|| {
                StreamError::Transport(format!(
                    "DescribeStreamSummary for {} returned no summary",
                    self.stream_name
                ))
            })
    }

    /// Waits for the stream to become active, polling every
    /// [`STREAM_POLL_INTERVAL`] for up to [`STREAM_WAIT_TIMEOUT`].
    pub async fn wait_until_active(&self, timer: &dyn Timer) -> StreamResult<()> {
        wait_for_active_stream(
            &self.stream_name,
            timer,
            STREAM_POLL_INTERVAL,
            STREAM_WAIT_TIMEOUT,
            || self.stream_status(),
        )
        .await
    }
}

#[async_trait]
impl RecordTransport for KinesisTransport {
    async fn put_record(&self, partition_key: &str, body: Vec<u8>) -> StreamResult<PutRecordOutput> {
        let size = body.len();
        let resp = self
            .client
            .put_record()
            .stream_name(&self.stream_name)
            .partition_key(partition_key)
            .data(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                StreamError::Transport(format!("PutRecord to {} failed: {e}", self.stream_name))
            })?;

        debug!(
            "put {size} bytes to {} shard {} (seq {})",
            self.stream_name,
            resp.shard_id(),
            resp.sequence_number()
        );
        Ok(PutRecordOutput {
            shard_id: resp.shard_id().to_string(),
            sequence_number: resp.sequence_number().to_string(),
        })
    }

    async fn wait_until_ready(&self, timer: &dyn Timer) -> StreamResult<()> {
        self.wait_until_active(timer).await
    }
}
