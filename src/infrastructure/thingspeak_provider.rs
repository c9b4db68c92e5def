// ThingSpeak feed provider implementation
use crate::application::telemetry_provider::{FeedEntry, FeedSource, TelemetryProvider};
use crate::domain::error::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ThingSpeakProvider {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feeds: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl ThingSpeakProvider {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn build_feed_url(&self, source: &FeedSource, field: u8, limit: usize) -> String {
        format!(
            "{}/{}/fields/{}.json?api_key={}&results={}",
            self.base_url,
            source.channel_id,
            field,
            urlencoding::encode(&source.read_api_key),
            limit
        )
    }

    /// Extracts `(created_at, fieldN)` pairs from a feed body. Entries without
    /// a timestamp are skipped; empty or null field values become `None`.
    fn parse_feed(body: &str, field: u8) -> Result<Vec<FeedEntry>, ProviderError> {
        let response: FeedResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::Unavailable(format!("undecodable feed: {}", e)))?;

        let key = format!("field{}", field);
        let entries: Vec<FeedEntry> = response
            .feeds
            .into_iter()
            .filter_map(|entry| {
                let timestamp = entry.get("created_at")?.as_str()?.to_string();
                let value = match entry.get(&key) {
                    Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                Some(FeedEntry { timestamp, value })
            })
            .collect();

        if entries.is_empty() {
            return Err(ProviderError::Unavailable(format!("empty feed for {}", key)));
        }
        Ok(entries)
    }
}

#[async_trait]
impl TelemetryProvider for ThingSpeakProvider {
    async fn fetch_channel_feed(
        &self,
        source: &FeedSource,
        field: u8,
        limit: usize,
    ) -> Result<Vec<FeedEntry>, ProviderError> {
        let url = self.build_feed_url(source, field, limit);
        tracing::debug!(channel = source.channel_id, field, limit, "Fetching ThingSpeak feed");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "ThingSpeak returned {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("failed to read body: {}", e)))?;

        let entries = Self::parse_feed(&body, field)?;
        tracing::debug!(
            channel = source.channel_id,
            field,
            entries = entries.len(),
            "Fetched ThingSpeak feed"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_feed_url() {
        let provider =
            ThingSpeakProvider::new("https://api.thingspeak.com/channels/".into(), Duration::from_secs(5))
                .unwrap();
        let source = FeedSource {
            channel_id: 441742,
            read_api_key: "AB C+".into(),
        };
        assert_eq!(
            provider.build_feed_url(&source, 3, 1000),
            "https://api.thingspeak.com/channels/441742/fields/3.json?api_key=AB%20C%2B&results=1000"
        );
    }

    #[test]
    fn test_parse_feed() {
        let body = r#"{
            "channel": {"id": 441742, "name": "IODR #2", "field3": "tube 3"},
            "feeds": [
                {"created_at": "2024-03-01T10:00:00Z", "entry_id": 1, "field3": "0.123"},
                {"created_at": "2024-03-01T10:01:00Z", "entry_id": 2, "field3": null},
                {"created_at": "2024-03-01T10:02:00Z", "entry_id": 3, "field3": 0.125},
                {"entry_id": 4, "field3": "0.2"}
            ]
        }"#;

        let entries = ThingSpeakProvider::parse_feed(body, 3).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].value.as_deref(), Some("0.123"));
        assert_eq!(entries[1].value, None);
        assert_eq!(entries[2].value.as_deref(), Some("0.125"));
        assert_eq!(entries[2].timestamp, "2024-03-01T10:02:00Z");
    }

    #[test]
    fn test_empty_or_invalid_feed_is_unavailable() {
        let empty = ThingSpeakProvider::parse_feed(r#"{"feeds": []}"#, 1);
        assert!(matches!(empty, Err(ProviderError::Unavailable(_))));

        // ThingSpeak answers "-1" for a bad read key
        let invalid = ThingSpeakProvider::parse_feed("-1", 1);
        assert!(matches!(invalid, Err(ProviderError::Unavailable(_))));
    }
}
