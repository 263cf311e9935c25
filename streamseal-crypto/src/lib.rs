//! Cipher layer for streamseal.
//!
//! Provides the symmetric half of envelope encryption:
//! - AES-GCM (128 or 256 bit) sealing with a fresh nonce per call
//! - [`DataKey`]: plaintext key material bound to its wrapped form
//!
//! # Architecture
//!
//! Keys come in two tiers:
//!
//! 1. **Master Key**: lives in the key-management service and never leaves
//!    it. It only wraps and unwraps data keys.
//!
//! 2. **Data Key**: generated by the key-management service, used directly
//!    to seal payloads. Its wrapped form is shipped next to every ciphertext
//!    so a reader only needs the record and unwrap access.

mod cipher;
mod data_key;
mod error;

pub use cipher::{KeySpec, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use data_key::{DataKey, generate_key_material, wrapped_key_fingerprint};
pub use error::{CryptoError, CryptoResult};
pub use zeroize::Zeroizing;
