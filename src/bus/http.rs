//! HTTP bus client for a Handoff hub

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{Bus, EntryId, StreamEntry};
use crate::error::BusError;

/// Bus client talking to the hub's `/bus` routes
pub struct HttpBus {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub id: EntryId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpireRequest {
    pub ttl_ms: u64,
}

impl HttpBus {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Build `{base_url}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BusError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BusError::Request(format!("Invalid hub URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| BusError::Request(format!("Hub URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BusError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(BusError::Status { status, body })
    }
}

#[async_trait]
impl Bus for HttpBus {
    async fn publish(&self, topic: &str, message: Value) -> Result<EntryId, BusError> {
        let url = self.endpoint(&["bus", "topics", topic])?;
        let response = self.client.post(url).json(&message).send().await?;
        let published: PublishResponse = Self::check(response).await?.json().await?;
        Ok(published.id)
    }

    async fn read(
        &self,
        stream: &str,
        max_count: usize,
        since: Option<EntryId>,
    ) -> Result<Vec<StreamEntry>, BusError> {
        let mut url = self.endpoint(&["bus", "streams", stream])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("max_count", &max_count.to_string());
            if let Some(since) = since {
                query.append_pair("since", &since.to_string());
            }
        }

        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn expire(&self, stream: &str, ttl: Duration) -> Result<(), BusError> {
        let url = self.endpoint(&["bus", "streams", stream, "expire"])?;
        let response = self
            .client
            .post(url)
            .json(&ExpireRequest {
                ttl_ms: ttl.as_millis() as u64,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
