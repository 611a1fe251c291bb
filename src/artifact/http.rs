//! HTTP artifact backend talking to a Handoff hub

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};

use super::ArtifactBackend;
use crate::error::ArtifactError;

pub struct HttpArtifactBackend {
    client: Client,
    base_url: String,
}

impl HttpArtifactBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, bucket: &str, key: &str) -> Result<Url, ArtifactError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ArtifactError::Backend(format!("Invalid hub URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ArtifactError::Backend(format!("Hub URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["artifacts", bucket, key]);
        Ok(url)
    }
}

#[async_trait]
impl ArtifactBackend for HttpArtifactBackend {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        let url = self.endpoint(bucket, key)?;
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ArtifactError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ArtifactError::Backend(format!(
                "Failed to store artifact: {} - {}",
                status, text
            )));
        }

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ArtifactError> {
        let url = self.endpoint(bucket, key)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArtifactError::Backend(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ArtifactError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ArtifactError::Backend(format!(
                "Failed to fetch artifact: {} - {}",
                status, text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArtifactError::Backend(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let backend = HttpArtifactBackend::new("http://localhost:3000");
        let url = backend.endpoint("payloads", "abc-123").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/artifacts/payloads/abc-123");
    }
}
