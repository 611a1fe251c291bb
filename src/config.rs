//! Substrate configuration

use std::time::Duration;

use crate::error::{HandoffError, Result};

/// Tunables shared by the delegation engines, the inbox and the in-memory bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateConfig {
    /// Payloads whose JSON encoding is larger than this are offloaded
    pub inline_threshold_bytes: usize,
    /// Upper bound on a single wait between stream reads
    pub poll_interval: Duration,
    /// Timeout applied when a caller does not give one
    pub default_timeout: Duration,
    /// Max entries fetched per stream read
    pub read_batch_size: usize,
    /// How long a response stream survives once its delegation finished
    pub response_stream_ttl: Duration,
    /// Idle retention for any bus stream, refreshed on every publish
    pub stream_retention: Duration,
    /// Oldest entries are trimmed past this length
    pub stream_max_len: usize,
    /// Bucket used for offloaded task payloads and results
    pub artifact_bucket: String,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            inline_threshold_bytes: 64 * 1024,
            poll_interval: Duration::from_millis(50),
            default_timeout: Duration::from_secs(30),
            read_batch_size: 64,
            response_stream_ttl: Duration::from_secs(60),
            stream_retention: Duration::from_secs(60 * 60),
            stream_max_len: 10_000,
            artifact_bucket: "delegation-payloads".to_string(),
        }
    }
}

impl SubstrateConfig {
    /// Defaults overlaid with `HANDOFF_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("HANDOFF_INLINE_THRESHOLD_BYTES") {
            config.inline_threshold_bytes = parse_number("HANDOFF_INLINE_THRESHOLD_BYTES", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("HANDOFF_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_DEFAULT_TIMEOUT_MS") {
            config.default_timeout = parse_millis("HANDOFF_DEFAULT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_READ_BATCH_SIZE") {
            config.read_batch_size = parse_number("HANDOFF_READ_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_RESPONSE_STREAM_TTL_MS") {
            config.response_stream_ttl = parse_millis("HANDOFF_RESPONSE_STREAM_TTL_MS", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_STREAM_RETENTION_MS") {
            config.stream_retention = parse_millis("HANDOFF_STREAM_RETENTION_MS", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_STREAM_MAX_LEN") {
            config.stream_max_len = parse_number("HANDOFF_STREAM_MAX_LEN", &v)?;
        }
        if let Some(v) = lookup("HANDOFF_ARTIFACT_BUCKET") {
            if v.trim().is_empty() {
                return Err(HandoffError::InvalidArgument(
                    "HANDOFF_ARTIFACT_BUCKET must not be empty".to_string(),
                ));
            }
            config.artifact_bucket = v;
        }

        if config.read_batch_size == 0 {
            return Err(HandoffError::InvalidArgument(
                "HANDOFF_READ_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| HandoffError::InvalidArgument(format!("{}={:?}: {}", key, value, e)))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    parse_number(key, value).map(|ms| Duration::from_millis(ms as u64))
}
