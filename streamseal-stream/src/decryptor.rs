//! Consumer-side envelope decryption.

use std::sync::Arc;

use streamseal_crypto::{Zeroizing, wrapped_key_fingerprint};
use tracing::debug;

use crate::codec::{self, WireRecord};
use crate::error::StreamResult;
use crate::key_cache::KeyCache;
use crate::key_manager::KeyManager;

/// Opens wire records, unwrapping each distinct data key once.
pub struct EnvelopeDecryptor {
    key_manager: Arc<dyn KeyManager>,
    cache: KeyCache,
}

impl EnvelopeDecryptor {
    /// Creates a decryptor with an empty key cache.
    pub fn new(key_manager: Arc<dyn KeyManager>) -> Self {
        Self::with_cache(key_manager, KeyCache::new())
    }

    pub fn with_cache(key_manager: Arc<dyn KeyManager>, cache: KeyCache) -> Self {
        Self { key_manager, cache }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Decodes a transport body and decrypts it.
    pub async fn decrypt_bytes(&self, body: &[u8]) -> StreamResult<Vec<u8>> {
        let record = codec::decode(body)?;
        self.decrypt(&record).await
    }

    /// Decrypts a wire record.
    ///
    /// Key-service failures surface as `KeyService` (retryable); tag
    /// mismatches surface as `Cipher` and will fail the same way on retry.
    pub async fn decrypt(&self, record: &WireRecord) -> StreamResult<Vec<u8>> {
        let key = self.resolve_key(&record.wrapped_key).await?;
        Ok(streamseal_crypto::decrypt(&key, &record.ciphertext)?)
    }

    /// Returns the plaintext for a wrapped key, unwrapping on a cache miss.
    pub async fn resolve_key(&self, wrapped: &[u8]) -> StreamResult<Arc<Zeroizing<Vec<u8>>>> {
        if let Some(key) = self.cache.get(wrapped).await {
            return Ok(key);
        }

        let plaintext = self.key_manager.unwrap(wrapped).await?;
        debug!(
            "unwrapped data key {} ({} cached before)",
            wrapped_key_fingerprint(wrapped),
            self.cache.len().await
        );
        Ok(self.cache.insert(wrapped.to_vec(), plaintext).await)
    }
}
