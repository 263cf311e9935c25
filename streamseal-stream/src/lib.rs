//! Envelope-encrypted stream records for streamseal.
//!
//! Provides both ends of an encrypted, sharded, at-least-once stream:
//! - Producer-side encryption under a periodically rotated data key
//! - Self-describing wire records (`{"key": ..., "data": ...}`)
//! - Consumer-side decryption with a per-shard unwrapped key cache
//! - Shard processors with bounded record retries and checkpointing
//! - AWS KMS and Kinesis adapters behind async traits

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod decryptor;
pub mod encryptor;
pub mod error;
pub mod handler;
pub mod key_cache;
pub mod key_manager;
pub mod kms;
pub mod producer;
pub mod retry;
pub mod shard_processor;
pub mod telemetry;
pub mod timer;
pub mod transport;
pub mod types;

pub use config::StreamConfig;
pub use error::{CheckpointError, StreamError, StreamResult};
pub use types::*;
