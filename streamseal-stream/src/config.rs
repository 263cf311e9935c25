//! Producer and consumer configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamseal_crypto::KeySpec;
use uuid::Uuid;

use crate::error::{StreamError, StreamResult};
use crate::retry::RetryPolicy;
use crate::types::InitialPosition;

/// Configuration shared by the producer and the shard consumers.
///
/// Values are passed explicitly into constructors; nothing reads them from
/// process-wide state.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Name of the stream records are written to and read from.
    pub stream_name: String,

    /// Consumer application (lease table) name. Handed to the lease
    /// coordinator through `LeaseSettings`.
    pub application_name: String,

    /// Key alias used for data key generation (with or without `alias/`).
    pub key_alias: String,

    /// AWS region for KMS and Kinesis.
    pub region: String,

    /// Optional endpoint override (for localstack in testing).
    pub endpoint_override: Option<String>,

    /// Where to start reading a shard that has no checkpoint yet. Applied by
    /// the lease coordinator, see `LeaseSettings`.
    pub initial_position: InitialPosition,

    /// Spec of generated data keys.
    pub key_spec: KeySpec,

    /// How often the producer rotates its data key (seconds).
    pub key_rotation_interval_secs: u64,

    /// Minimum time between periodic checkpoints (milliseconds).
    pub checkpoint_interval_ms: u64,

    /// Attempts per record and per checkpoint.
    pub retry_count: u32,

    /// Fixed delay between attempts (milliseconds).
    pub backoff_ms: u64,

    /// Worker identity registered with the lease coordinator; generated by
    /// `resolve_worker_id` when absent.
    pub worker_id: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: "streamseal-records".to_string(),
            application_name: "streamseal-consumer".to_string(),
            key_alias: "streamseal".to_string(),
            region: "us-east-1".to_string(),
            endpoint_override: None,
            initial_position: InitialPosition::Latest,
            key_spec: KeySpec::Aes128,
            key_rotation_interval_secs: 60,
            checkpoint_interval_ms: 60_000,
            retry_count: 10,
            backoff_ms: 3_000,
            worker_id: None,
        }
    }
}

impl StreamConfig {
    /// Loads and validates a JSON config file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> StreamResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: StreamConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the producer or consumer cannot run with.
    pub fn validate(&self) -> StreamResult<()> {
        if self.stream_name.trim().is_empty() {
            return Err(StreamError::Config("stream_name must not be empty".into()));
        }
        if self.application_name.trim().is_empty() {
            return Err(StreamError::Config(
                "application_name must not be empty".into(),
            ));
        }
        if self.key_alias.trim().is_empty() {
            return Err(StreamError::Config("key_alias must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(StreamError::Config("region must not be empty".into()));
        }
        if self.retry_count == 0 {
            return Err(StreamError::Config("retry_count must be at least 1".into()));
        }
        if self.key_rotation_interval_secs == 0 {
            return Err(StreamError::Config(
                "key_rotation_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy applied to record processing and checkpointing.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_millis(self.backoff_ms))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.key_rotation_interval_secs)
    }

    /// Returns the configured worker id, generating `<application>-<uuid>`
    /// on first use.
    pub fn resolve_worker_id(&mut self) -> &str {
        let application = &self.application_name;
        self.worker_id
            .get_or_insert_with(|| format!("{application}-{}", Uuid::new_v4()))
            .as_str()
    }
}
