//! AWS KMS data key operations.
//!
//! Data keys come from `GenerateDataKey` against a key alias; wrapped keys
//! are recovered with `Decrypt`, which needs no key id because the
//! ciphertext blob names its master key.

use async_trait::async_trait;
use aws_sdk_kms::Client as KmsClient;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use streamseal_crypto::{DataKey, KeySpec, Zeroizing};
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::key_manager::KeyManager;

/// [`KeyManager`] backed by AWS KMS.
pub struct KmsKeyManager {
    client: KmsClient,
    key_spec: KeySpec,
}

impl KmsKeyManager {
    pub fn new(client: KmsClient, key_spec: KeySpec) -> Self {
        Self { client, key_spec }
    }

    /// Builds a client for the configured region and endpoint.
    pub async fn from_config(config: &StreamConfig) -> Self {
        let sdk_config =
            load_sdk_config(&config.region, config.endpoint_override.as_deref()).await;
        Self::new(KmsClient::new(&sdk_config), config.key_spec)
    }
}

#[async_trait]
impl KeyManager for KmsKeyManager {
    async fn generate_data_key(&self, alias: &str) -> StreamResult<DataKey> {
        let key_id = key_id_for_alias(alias);

        let resp = self
            .client
            .generate_data_key()
            .key_id(&key_id)
            .key_spec(data_key_spec(self.key_spec))
            .send()
            .await
            .map_err(|e| StreamError::KeyService(format!("GenerateDataKey failed for {key_id}: {e}")))?;

        let plaintext = resp
            .plaintext()
            .map(|blob| Zeroizing::new(blob.as_ref().to_vec()))
            .ok_or_else(|| {
                StreamError::KeyService(format!("GenerateDataKey for {key_id} returned no plaintext"))
            })?;
        let wrapped = resp
            .ciphertext_blob()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| {
                StreamError::KeyService(format!(
                    "GenerateDataKey for {key_id} returned no ciphertext blob"
                ))
            })?;

        let key = DataKey::with_spec(plaintext, wrapped, self.key_spec).map_err(|e| {
            StreamError::KeyService(format!("GenerateDataKey for {key_id} returned bad key: {e}"))
        })?;
        debug!("generated data key {} under {key_id}", key.fingerprint());
        Ok(key)
    }

    async fn unwrap(&self, wrapped: &[u8]) -> StreamResult<Zeroizing<Vec<u8>>> {
        let resp = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(wrapped.to_vec()))
            .send()
            .await
            .map_err(|e| StreamError::KeyService(format!("Decrypt failed: {e}")))?;

        resp.plaintext()
            .map(|blob| Zeroizing::new(blob.as_ref().to_vec()))
            .ok_or_else(|| StreamError::KeyService("Decrypt returned no plaintext".into()))
    }
}

/// Normalizes a bare alias to the `alias/<name>` key id form.
pub fn key_id_for_alias(alias: &str) -> String {
    if alias.starts_with("alias/") || alias.starts_with("arn:") {
        alias.to_string()
    } else {
        format!("alias/{alias}")
    }
}

fn data_key_spec(spec: KeySpec) -> DataKeySpec {
    match spec {
        KeySpec::Aes128 => DataKeySpec::Aes128,
        KeySpec::Aes256 => DataKeySpec::Aes256,
    }
}

/// Loads shared AWS configuration for a region, with an optional endpoint
/// override (localstack).
pub(crate) async fn load_sdk_config(
    region: &str,
    endpoint_override: Option<&str>,
) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_types::region::Region::new(region.to_string()));

    if let Some(endpoint) = endpoint_override {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}
