//! Cache of unwrapped data keys, keyed by wrapped-key bytes.
//!
//! Producers rotate keys on a fixed schedule, so a consumer only ever sees a
//! small number of distinct wrapped keys and the cache is left unbounded.
//! It exists to avoid one unwrap call per record.

use std::collections::HashMap;
use std::sync::Arc;

use streamseal_crypto::Zeroizing;
use tokio::sync::RwLock;

/// Thread-safe map from wrapped key to plaintext key material.
#[derive(Clone, Default)]
pub struct KeyCache {
    keys: Arc<RwLock<HashMap<Vec<u8>, Arc<Zeroizing<Vec<u8>>>>>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plaintext for a wrapped key.
    pub async fn get(&self, wrapped: &[u8]) -> Option<Arc<Zeroizing<Vec<u8>>>> {
        self.keys.read().await.get(wrapped).cloned()
    }

    /// Caches a plaintext key, keeping the existing entry if one is already
    /// present.
    pub async fn insert(
        &self,
        wrapped: Vec<u8>,
        plaintext: Zeroizing<Vec<u8>>,
    ) -> Arc<Zeroizing<Vec<u8>>> {
        let mut keys = self.keys.write().await;
        keys.entry(wrapped)
            .or_insert_with(|| Arc::new(plaintext))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Drops every cached key.
    pub async fn clear(&self) {
        self.keys.write().await.clear();
    }
}
