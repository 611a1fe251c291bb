//! Artifact store client
//!
//! Large payloads are written to a backend under a bucket + generated key and
//! travel through the bus as an `ArtifactReference`. The reference alone is
//! enough to read the bytes back; retention is left to the backend.

pub mod http;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ArtifactError, HandoffError, Result};
use crate::models::{ArtifactReference, PayloadBody};

pub use http::HttpArtifactBackend;
pub use memory::InMemoryArtifactBackend;
pub use sqlite::SqliteArtifactBackend;

/// Raw blob storage
#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), ArtifactError>;

    /// Fails with `ArtifactError::NotFound` when nothing is stored under the key
    async fn get(&self, bucket: &str, key: &str) -> std::result::Result<Vec<u8>, ArtifactError>;
}

/// Lowercase hex SHA-256
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Client wrapper over an `ArtifactBackend`
#[derive(Clone)]
pub struct ArtifactStore {
    backend: Arc<dyn ArtifactBackend>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn ArtifactBackend>) -> Self {
        Self { backend }
    }

    /// Store `bytes` under a fresh key in `bucket`
    pub async fn store(&self, bucket: &str, bytes: Vec<u8>) -> Result<ArtifactReference> {
        if bucket.trim().is_empty() {
            return Err(HandoffError::InvalidArgument(
                "bucket must not be empty".to_string(),
            ));
        }

        let reference = ArtifactReference {
            bucket: bucket.to_string(),
            key: Uuid::new_v4().to_string(),
            content_length: bytes.len() as u64,
            content_hash: content_hash(&bytes),
        };

        self.backend
            .put(&reference.bucket, &reference.key, bytes)
            .await?;

        tracing::debug!(
            "Stored artifact {}/{} ({} bytes)",
            reference.bucket,
            reference.key,
            reference.content_length
        );

        Ok(reference)
    }

    /// Read back the bytes behind `reference`, verifying length and hash
    pub async fn retrieve(&self, reference: &ArtifactReference) -> Result<Vec<u8>> {
        let bytes = self.backend.get(&reference.bucket, &reference.key).await?;

        if bytes.len() as u64 != reference.content_length {
            tracing::warn!(
                "Artifact {}/{} length mismatch",
                reference.bucket,
                reference.key
            );
            return Err(ArtifactError::Corrupted {
                bucket: reference.bucket.clone(),
                key: reference.key.clone(),
                reason: format!(
                    "expected {} bytes, found {}",
                    reference.content_length,
                    bytes.len()
                ),
            }
            .into());
        }

        if content_hash(&bytes) != reference.content_hash {
            tracing::warn!("Artifact {}/{} hash mismatch", reference.bucket, reference.key);
            return Err(ArtifactError::Corrupted {
                bucket: reference.bucket.clone(),
                key: reference.key.clone(),
                reason: "content hash mismatch".to_string(),
            }
            .into());
        }

        Ok(bytes)
    }

    /// Encode `value` inline, or offload it when its JSON is larger than `threshold` bytes
    pub async fn encode_payload<T: Serialize>(
        &self,
        value: &T,
        bucket: &str,
        threshold: usize,
    ) -> Result<PayloadBody> {
        let bytes = serde_json::to_vec(value)?;
        if bytes.len() <= threshold {
            return Ok(PayloadBody::Inline {
                value: serde_json::to_value(value)?,
            });
        }

        let reference = self.store(bucket, bytes).await?;
        Ok(PayloadBody::Artifact { reference })
    }

    /// Inverse of `encode_payload`
    pub async fn decode_payload(&self, body: PayloadBody) -> Result<Value> {
        match body {
            PayloadBody::Inline { value } => Ok(value),
            PayloadBody::Artifact { reference } => {
                let bytes = self.retrieve(&reference).await?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}
