//! AES-GCM sealing under a raw data key.
//!
//! Sealed layout: `[12 bytes: nonce][N bytes: ciphertext + 16 byte tag]`.
//! Each call builds its own cipher context from the key bytes and draws a
//! fresh random nonce, so nothing is shared between calls.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Data key specification, mirroring the key-management service's key specs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySpec {
    /// 128-bit AES key.
    #[default]
    Aes128,
    /// 256-bit AES key.
    Aes256,
}

impl KeySpec {
    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            KeySpec::Aes128 => 16,
            KeySpec::Aes256 => 32,
        }
    }

    /// Resolves a spec from raw key material length.
    pub fn from_key_len(len: usize) -> CryptoResult<Self> {
        match len {
            16 => Ok(KeySpec::Aes128),
            32 => Ok(KeySpec::Aes256),
            other => Err(CryptoError::UnsupportedKeyLength(other)),
        }
    }

    /// The service-side name of the spec (`AES_128` / `AES_256`).
    pub fn as_str(self) -> &'static str {
        match self {
            KeySpec::Aes128 => "AES_128",
            KeySpec::Aes256 => "AES_256",
        }
    }
}

/// Encrypts `plaintext` under `key`, returning `nonce || ciphertext || tag`.
///
/// The key length selects AES-128-GCM or AES-256-GCM.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    match KeySpec::from_key_len(key.len())? {
        KeySpec::Aes128 => seal::<Aes128Gcm>(key, plaintext),
        KeySpec::Aes256 => seal::<Aes256Gcm>(key, plaintext),
    }
}

/// Decrypts a sealed buffer produced by [`encrypt`].
///
/// Fails with [`CryptoError::Decryption`] when the tag does not verify
/// (wrong key, corrupted or tampered data).
pub fn decrypt(key: &[u8], sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    let spec = KeySpec::from_key_len(key.len())?;

    let minimum = NONCE_SIZE + TAG_SIZE;
    if sealed.len() < minimum {
        return Err(CryptoError::CiphertextTooShort {
            minimum,
            actual: sealed.len(),
        });
    }

    match spec {
        KeySpec::Aes128 => open::<Aes128Gcm>(key, sealed),
        KeySpec::Aes256 => open::<Aes256Gcm>(key, sealed),
    }
}

fn seal<C>(key: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: C::key_size(),
        actual: key.len(),
    })?;
    let nonce = C::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM seal failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open<C>(key: &[u8], sealed: &[u8]) -> CryptoResult<Vec<u8>>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: C::key_size(),
        actual: key.len(),
    })?;
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::<C>::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
    })
}
