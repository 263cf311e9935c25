//! Producer-side envelope encryption with periodic data key rotation.
//!
//! The encryptor keeps a single "current" data key. A background task
//! replaces it on a fixed schedule; `encrypt` always uses whatever key is
//! current at call time. Records sealed around a rotation boundary may use
//! either key, which is fine because every record carries its wrapped key.

use std::sync::Arc;
use std::time::Duration;

use streamseal_crypto::DataKey;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::WireRecord;
use crate::config::StreamConfig;
use crate::error::StreamResult;
use crate::key_manager::KeyManager;
use crate::timer::wait_for_shutdown;

/// Seals payloads under a rotating data key.
pub struct EnvelopeEncryptor {
    key_manager: Arc<dyn KeyManager>,
    key_alias: String,
    rotation_interval: Duration,
    current: RwLock<Option<Arc<DataKey>>>,
}

impl EnvelopeEncryptor {
    pub fn new(
        key_manager: Arc<dyn KeyManager>,
        key_alias: impl Into<String>,
        rotation_interval: Duration,
    ) -> Self {
        Self {
            key_manager,
            key_alias: key_alias.into(),
            rotation_interval,
            current: RwLock::new(None),
        }
    }

    pub fn from_config(key_manager: Arc<dyn KeyManager>, config: &StreamConfig) -> Self {
        Self::new(key_manager, config.key_alias.clone(), config.rotation_interval())
    }

    pub fn key_alias(&self) -> &str {
        &self.key_alias
    }

    /// Returns the current data key, if one has been generated.
    pub async fn current_key(&self) -> Option<Arc<DataKey>> {
        self.current.read().await.clone()
    }

    /// Generates a new data key and makes it current.
    ///
    /// On failure the previous key (if any) stays current.
    pub async fn rotate_key(&self) -> StreamResult<Arc<DataKey>> {
        let key = Arc::new(self.key_manager.generate_data_key(&self.key_alias).await?);

        let mut current = self.current.write().await;
        *current = Some(Arc::clone(&key));

        info!(
            "rotated data key for alias {} (key {})",
            self.key_alias,
            key.fingerprint()
        );
        Ok(key)
    }

    /// Seals `payload` under the current data key, generating one first if
    /// none exists yet.
    pub async fn encrypt(&self, payload: &[u8]) -> StreamResult<WireRecord> {
        let key = self.current_or_rotate().await?;
        let ciphertext = key.encrypt(payload)?;

        debug!(
            "sealed {} payload bytes into {} ciphertext bytes under key {}",
            payload.len(),
            ciphertext.len(),
            key.fingerprint()
        );
        Ok(WireRecord::new(key.wrapped().to_vec(), ciphertext))
    }

    /// Starts the periodic rotation task.
    ///
    /// The first rotation happens immediately. A failed rotation is logged
    /// and retried on the next tick; the task ends only when `shutdown`
    /// is signalled.
    pub fn spawn_rotation(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = this.rotation_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let stop = wait_for_shutdown(shutdown);
            tokio::pin!(stop);

            loop {
                tokio::select! {
                    _ = &mut stop => {
                        info!("data key rotation for alias {} stopping", this.key_alias);
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = this.rotate_key().await {
                            warn!(
                                "data key rotation for alias {} failed, retrying next tick: {e}",
                                this.key_alias
                            );
                        }
                    }
                }
            }
        })
    }

    async fn current_or_rotate(&self) -> StreamResult<Arc<DataKey>> {
        if let Some(key) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(key));
        }

        // Write lock is held across generation: concurrent first callers
        // share one key.
        let mut current = self.current.write().await;
        if let Some(key) = current.as_ref() {
            return Ok(Arc::clone(key));
        }

        let key = Arc::new(self.key_manager.generate_data_key(&self.key_alias).await?);
        info!(
            "generated initial data key for alias {} (key {})",
            self.key_alias,
            key.fingerprint()
        );
        *current = Some(Arc::clone(&key));
        Ok(key)
    }
}
