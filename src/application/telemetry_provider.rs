// Provider trait for telemetry feed access
use crate::domain::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;

/// Where a device publishes its readings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSource {
    pub channel_id: u64,
    pub read_api_key: String,
}

/// A single entry of one field's feed, exactly as the source reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub timestamp: String,
    pub value: Option<String>,
}

#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Fetch up to `limit` of the most recent entries of one field (1-based).
    /// Ordering is not guaranteed; an empty feed is an error.
    async fn fetch_channel_feed(
        &self,
        source: &FeedSource,
        field: u8,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, ProviderError>;
}
