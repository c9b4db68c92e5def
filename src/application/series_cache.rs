// Last successfully loaded telemetry per device
use crate::domain::series::Series;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub device_id: String,
    /// Everything the provider returned, for export.
    pub full: Series,
    /// Thinned series every recomputation starts from.
    pub reduced: Series,
    pub temperature: Option<Series>,
    pub rejected_rows: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Holds one snapshot per device. A snapshot is only ever replaced whole, by
/// a newer successful load.
#[derive(Clone, Default)]
pub struct SeriesCache {
    inner: Arc<RwLock<HashMap<String, Arc<DeviceSnapshot>>>>,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, device_id: &str) -> Option<Arc<DeviceSnapshot>> {
        self.inner.read().await.get(device_id).cloned()
    }

    pub async fn store(&self, snapshot: DeviceSnapshot) -> Arc<DeviceSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.inner
            .write()
            .await
            .insert(snapshot.device_id.clone(), snapshot.clone());
        snapshot
    }
}
