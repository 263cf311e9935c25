//! Data key generation and unwrapping.
//!
//! [`KeyManager`] is the seam to the key-management service. The production
//! implementation is [`crate::kms::KmsKeyManager`]; [`LocalKeyManager`]
//! wraps keys under an in-process master key for local runs and tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use streamseal_crypto::{DataKey, KeySpec, Zeroizing, generate_key_material};
use tracing::debug;

use crate::error::{StreamError, StreamResult};

/// Generates and unwraps data keys.
///
/// Implementations report every failure as [`StreamError::KeyService`].
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Creates a fresh data key under the master key named by `alias`.
    async fn generate_data_key(&self, alias: &str) -> StreamResult<DataKey>;

    /// Recovers the plaintext of a wrapped data key.
    async fn unwrap(&self, wrapped: &[u8]) -> StreamResult<Zeroizing<Vec<u8>>>;
}

/// Key manager holding its master key in process memory.
///
/// Wrapped keys are the AES-256-GCM sealing of the data key under the master
/// key, so a different `LocalKeyManager` cannot unwrap them.
pub struct LocalKeyManager {
    master_key: Zeroizing<Vec<u8>>,
    key_spec: KeySpec,
    generate_calls: AtomicU64,
    unwrap_calls: AtomicU64,
}

impl LocalKeyManager {
    /// Creates a manager with a random master key.
    pub fn new(key_spec: KeySpec) -> Self {
        Self::with_master_key(generate_key_material(KeySpec::Aes256), key_spec)
    }

    /// Creates a manager around an existing 32-byte master key, so
    /// separate instances can share wrapped keys.
    pub fn with_master_key(master_key: Zeroizing<Vec<u8>>, key_spec: KeySpec) -> Self {
        Self {
            master_key,
            key_spec,
            generate_calls: AtomicU64::new(0),
            unwrap_calls: AtomicU64::new(0),
        }
    }

    pub fn generate_calls(&self) -> u64 {
        self.generate_calls.load(Ordering::Relaxed)
    }

    pub fn unwrap_calls(&self) -> u64 {
        self.unwrap_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl KeyManager for LocalKeyManager {
    async fn generate_data_key(&self, alias: &str) -> StreamResult<DataKey> {
        self.generate_calls.fetch_add(1, Ordering::Relaxed);

        let plaintext = generate_key_material(self.key_spec);
        let wrapped = streamseal_crypto::encrypt(&self.master_key, &plaintext)
            .map_err(|e| StreamError::KeyService(format!("local wrap failed: {e}")))?;

        let key = DataKey::with_spec(plaintext, wrapped, self.key_spec)
            .map_err(|e| StreamError::KeyService(format!("local data key rejected: {e}")))?;
        debug!("generated local data key {} for alias {alias}", key.fingerprint());
        Ok(key)
    }

    async fn unwrap(&self, wrapped: &[u8]) -> StreamResult<Zeroizing<Vec<u8>>> {
        self.unwrap_calls.fetch_add(1, Ordering::Relaxed);

        streamseal_crypto::decrypt(&self.master_key, wrapped)
            .map(Zeroizing::new)
            .map_err(|e| StreamError::KeyService(format!("local unwrap rejected: {e}")))
    }
}
