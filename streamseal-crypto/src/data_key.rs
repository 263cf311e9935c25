//! Rotating data keys for envelope encryption.
//!
//! A [`DataKey`] pairs plaintext key material with the wrapped form returned
//! by the key-management service. The plaintext never leaves the process and
//! is zeroized on drop; the wrapped bytes travel with every record sealed
//! under the key.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::cipher::{self, KeySpec};
use crate::error::{CryptoError, CryptoResult};

/// Immutable data key: plaintext material plus its wrapped form.
///
/// Rotation always builds a new `DataKey`; existing instances are never
/// mutated.
#[derive(Clone)]
pub struct DataKey {
    plaintext: Zeroizing<Vec<u8>>,
    wrapped: Vec<u8>,
    spec: KeySpec,
    created_at: DateTime<Utc>,
}

impl DataKey {
    /// Builds a data key from raw plaintext and its wrapped form.
    ///
    /// The plaintext length must match a supported [`KeySpec`].
    pub fn new(plaintext: Zeroizing<Vec<u8>>, wrapped: Vec<u8>) -> CryptoResult<Self> {
        let spec = KeySpec::from_key_len(plaintext.len())?;
        Ok(Self {
            plaintext,
            wrapped,
            spec,
            created_at: Utc::now(),
        })
    }

    /// Builds a data key, rejecting plaintext that does not match `spec`.
    pub fn with_spec(
        plaintext: Zeroizing<Vec<u8>>,
        wrapped: Vec<u8>,
        spec: KeySpec,
    ) -> CryptoResult<Self> {
        if plaintext.len() != spec.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: spec.key_len(),
                actual: plaintext.len(),
            });
        }
        Self::new(plaintext, wrapped)
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn wrapped(&self) -> &[u8] {
        &self.wrapped
    }

    pub fn spec(&self) -> KeySpec {
        self.spec
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Short, log-safe identifier derived from the wrapped key.
    pub fn fingerprint(&self) -> String {
        wrapped_key_fingerprint(&self.wrapped)
    }

    /// Seals `payload` under this key.
    pub fn encrypt(&self, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        cipher::encrypt(&self.plaintext, payload)
    }

    /// Opens a buffer sealed under this key.
    pub fn decrypt(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        cipher::decrypt(&self.plaintext, sealed)
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &"[REDACTED]")
            .field("wrapped", &self.fingerprint())
            .field("spec", &self.spec)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Generates random key material for `spec` from the OS RNG.
pub fn generate_key_material(spec: KeySpec) -> Zeroizing<Vec<u8>> {
    let mut material = Zeroizing::new(vec![0u8; spec.key_len()]);
    rand::rngs::OsRng.fill_bytes(&mut material);
    material
}

/// First 8 bytes of SHA-256 over the wrapped key, hex encoded.
pub fn wrapped_key_fingerprint(wrapped: &[u8]) -> String {
    let digest = Sha256::digest(wrapped);
    hex::encode(&digest[..8])
}
