//! In-process bus
//!
//! Streams live in a map behind a `tokio::sync::RwLock`. Each stream carries a
//! `watch` channel holding its last entry id so waiters wake on publish
//! instead of sleeping, and an expiry deadline that bounds how long stale
//! streams (e.g. late responses nobody reads) are retained.
//!
//! Entry ids come from one bus-wide sequence, so a stream that expires and is
//! recreated never hands out an id at or below a cursor taken before.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

use super::{Bus, EntryId, StreamEntry};
use crate::config::SubstrateConfig;
use crate::error::BusError;

struct Stream {
    entries: VecDeque<StreamEntry>,
    last_id: EntryId,
    expires_at: Instant,
    notify: watch::Sender<EntryId>,
}

impl Stream {
    fn new(expires_at: Instant) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            entries: VecDeque::new(),
            last_id: 0,
            expires_at,
            notify,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Bus held entirely in memory; shared by agents in one process or served by the hub
pub struct InMemoryBus {
    streams: RwLock<HashMap<String, Stream>>,
    last_id: AtomicU64,
    retention: Duration,
    max_len: usize,
}

impl InMemoryBus {
    pub fn new(retention: Duration, max_len: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            last_id: AtomicU64::new(0),
            retention,
            max_len: max_len.max(1),
        }
    }

    pub fn from_config(config: &SubstrateConfig) -> Self {
        Self::new(config.stream_retention, config.stream_max_len)
    }

    /// Number of live (unexpired) streams
    pub async fn stream_count(&self) -> usize {
        let now = Instant::now();
        let streams = self.streams.read().await;
        streams.values().filter(|s| !s.is_expired(now)).count()
    }

    /// Number of entries currently retained in `stream`
    pub async fn len(&self, stream: &str) -> usize {
        let now = Instant::now();
        let streams = self.streams.read().await;
        streams
            .get(stream)
            .filter(|s| !s.is_expired(now))
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Drop every expired stream
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut streams = self.streams.write().await;
        let before = streams.len();
        streams.retain(|_, s| !s.is_expired(now));
        before - streams.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::from_config(&SubstrateConfig::default())
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, topic: &str, message: Value) -> Result<EntryId, BusError> {
        let now = Instant::now();
        let mut streams = self.streams.write().await;

        let purged_before = streams.len();
        streams.retain(|_, s| !s.is_expired(now));
        if streams.len() < purged_before {
            tracing::debug!("Purged {} expired streams", purged_before - streams.len());
        }

        let stream = streams
            .entry(topic.to_string())
            .or_insert_with(|| Stream::new(now + self.retention));

        // Assigned under the write lock, so ids are also ordered within a stream
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        stream.last_id = id;
        stream.entries.push_back(StreamEntry {
            id,
            body: message,
            published_at: Utc::now(),
        });
        while stream.entries.len() > self.max_len {
            stream.entries.pop_front();
        }
        stream.expires_at = now + self.retention;
        stream.notify.send_replace(id);

        Ok(id)
    }

    async fn read(
        &self,
        stream: &str,
        max_count: usize,
        since: Option<EntryId>,
    ) -> Result<Vec<StreamEntry>, BusError> {
        let now = Instant::now();
        let streams = self.streams.read().await;
        let Some(s) = streams.get(stream).filter(|s| !s.is_expired(now)) else {
            return Ok(Vec::new());
        };

        let after = since.unwrap_or(0);
        Ok(s.entries
            .iter()
            .filter(|e| e.id > after)
            .take(max_count)
            .cloned()
            .collect())
    }

    async fn wait_for_entries(&self, stream: &str, since: Option<EntryId>, max_wait: Duration) {
        let mut rx = {
            let now = Instant::now();
            let mut streams = self.streams.write().await;
            let s = streams
                .entry(stream.to_string())
                .or_insert_with(|| Stream::new(now + self.retention));
            s.notify.subscribe()
        };

        if *rx.borrow_and_update() > since.unwrap_or(0) {
            return;
        }

        // Timing out here is the normal "nothing yet" case
        let _ = tokio::time::timeout(max_wait, rx.changed()).await;
    }

    async fn expire(&self, stream: &str, ttl: Duration) -> Result<(), BusError> {
        let mut streams = self.streams.write().await;
        if let Some(s) = streams.get_mut(stream) {
            s.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }
}
