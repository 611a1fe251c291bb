//! In-memory artifact backend

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ArtifactBackend;
use crate::error::ArtifactError;

/// Blobs kept in a map keyed by (bucket, key); never evicts
#[derive(Default)]
pub struct InMemoryArtifactBackend {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryArtifactBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Drop one blob, as a backend with its own eviction would
    pub async fn evict(&self, bucket: &str, key: &str) -> bool {
        let mut blobs = self.blobs.write().await;
        blobs.remove(&(bucket.to_string(), key.to_string())).is_some()
    }
}

#[async_trait]
impl ArtifactBackend for InMemoryArtifactBackend {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        let mut blobs = self.blobs.write().await;
        blobs.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let blobs = self.blobs.read().await;
        blobs
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let backend = InMemoryArtifactBackend::new();
        backend.put("b", "k", b"bytes".to_vec()).await.unwrap();
        assert_eq!(backend.get("b", "k").await.unwrap(), b"bytes".to_vec());
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_buckets_are_separate() {
        let backend = InMemoryArtifactBackend::new();
        backend.put("a", "k", b"1".to_vec()).await.unwrap();
        assert!(matches!(
            backend.get("b", "k").await,
            Err(ArtifactError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_evict() {
        let backend = InMemoryArtifactBackend::new();
        backend.put("b", "k", b"1".to_vec()).await.unwrap();
        assert!(backend.evict("b", "k").await);
        assert!(!backend.evict("b", "k").await);
        assert!(backend.is_empty().await);
    }
}
