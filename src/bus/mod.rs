//! Message bus abstraction
//!
//! Topics and streams share one namespace: publishing to a topic appends an
//! entry to the stream with the same name. Reads are non-blocking and take a
//! cursor, so re-polling is always safe.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::BusError;

pub use http::HttpBus;
pub use memory::InMemoryBus;

/// Per-stream entry id, strictly increasing from 1
pub type EntryId = u64;

/// One entry of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: EntryId,
    pub body: Value,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Append `message` to `topic`, returning the new entry id
    async fn publish(&self, topic: &str, message: Value) -> Result<EntryId, BusError>;

    /// Up to `max_count` entries with id greater than `since`, oldest first.
    /// Returns an empty vec for an empty or unknown stream.
    async fn read(
        &self,
        stream: &str,
        max_count: usize,
        since: Option<EntryId>,
    ) -> Result<Vec<StreamEntry>, BusError>;

    /// Suspend until `stream` may have entries newer than `since`, or
    /// `max_wait` elapses. Spurious wakeups are allowed.
    async fn wait_for_entries(&self, _stream: &str, _since: Option<EntryId>, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }

    /// Let `stream` be dropped `ttl` from now
    async fn expire(&self, _stream: &str, _ttl: Duration) -> Result<(), BusError> {
        Ok(())
    }
}
