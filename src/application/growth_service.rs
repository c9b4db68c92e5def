// Growth service - Use cases for loading device telemetry and predicting growth
use crate::application::request_gate::RequestGate;
use crate::application::series_cache::{DeviceSnapshot, SeriesCache};
use crate::application::telemetry_provider::{FeedEntry, FeedSource, TelemetryProvider};
use crate::domain::channel::{ChannelConfig, ChannelName};
use crate::domain::downsample;
use crate::domain::error::{EngineError, ProviderError};
use crate::domain::fit::FitWindow;
use crate::domain::pipeline::{self, ChannelPrediction, EstimateRow};
use crate::domain::series::{RawSample, Series};
use crate::domain::transform;
use crate::infrastructure::config::{AppConfig, DeviceConfig, PredictionSettings, ThinningSettings};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    pub channel: usize,
    pub window: Option<FitWindow>,
    pub config: Option<ChannelConfig>,
    /// Extra offset for the selected channel only.
    #[serde(default)]
    pub blank_offset: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    pub window: Option<FitWindow>,
    pub config: Option<ChannelConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub device_id: String,
    pub rows: usize,
    pub reduced_rows: usize,
    pub rejected_rows: usize,
    pub temperature_rows: Option<usize>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct GrowthService {
    provider: Arc<dyn TelemetryProvider>,
    devices: Vec<DeviceConfig>,
    temperature: Option<FeedSource>,
    feed_limit: usize,
    fetch_timeout: Duration,
    thinning: ThinningSettings,
    prediction: PredictionSettings,
    cache: SeriesCache,
    gate: Arc<RequestGate>,
}

impl GrowthService {
    pub fn new(provider: Arc<dyn TelemetryProvider>, config: &AppConfig) -> Self {
        Self {
            provider,
            devices: config.devices.clone(),
            temperature: config.temperature.clone(),
            feed_limit: config.thingspeak.feed_limit,
            fetch_timeout: Duration::from_secs(config.thingspeak.timeout_secs),
            thinning: config.thinning.clone(),
            prediction: config.prediction.clone(),
            cache: SeriesCache::new(),
            gate: Arc::new(RequestGate::new()),
        }
    }

    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    fn device(&self, device_id: &str) -> Result<&DeviceConfig, EngineError> {
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| EngineError::UnknownDevice(device_id.to_string()))
    }

    /// Pulls fresh telemetry for a device. On any failure the previously cached
    /// snapshot stays in place; a refresh overtaken by a newer one is dropped.
    pub async fn refresh(&self, device_id: &str) -> anyhow::Result<RefreshSummary> {
        let device = self.device(device_id)?.clone();
        let ticket = self.gate.begin(format!("refresh:{}", device.id));

        tracing::info!(device = %device.id, "Downloading OD telemetry");
        let raw = tokio::time::timeout(self.fetch_timeout, self.fetch_od(&device))
            .await
            .map_err(|_| ProviderError::Timeout(self.fetch_timeout.as_secs()))?
            .with_context(|| format!("Failed to fetch OD feeds for {}", device.id))?;

        let outcome = Series::load(&raw, device.channel_count);
        if outcome.series.is_empty() {
            return Err(ProviderError::Unavailable(format!(
                "no usable readings for {}",
                device.id
            ))
            .into());
        }

        let full = outcome.series;
        let reduced = downsample::reduce(
            &full,
            self.thinning.dense_window_hours,
            self.thinning.factor,
        );
        let temperature = self.fetch_temperature(&device).await;

        if !ticket.is_current() {
            tracing::info!(device = %device.id, "Discarding superseded refresh");
            return Err(EngineError::Superseded.into());
        }

        let snapshot = self
            .cache
            .store(DeviceSnapshot {
                device_id: device.id.clone(),
                full,
                reduced,
                temperature,
                rejected_rows: outcome.rejected.len(),
                loaded_at: Utc::now(),
            })
            .await;

        tracing::info!(
            device = %device.id,
            rows = snapshot.full.len(),
            reduced_rows = snapshot.reduced.len(),
            rejected = snapshot.rejected_rows,
            "Telemetry refreshed"
        );

        Ok(RefreshSummary {
            device_id: snapshot.device_id.clone(),
            rows: snapshot.full.len(),
            reduced_rows: snapshot.reduced.len(),
            rejected_rows: snapshot.rejected_rows,
            temperature_rows: snapshot.temperature.as_ref().map(Series::len),
            loaded_at: snapshot.loaded_at,
        })
    }

    async fn fetch_od(&self, device: &DeviceConfig) -> Result<Vec<RawSample>, ProviderError> {
        let fields = (1..=device.channel_count).filter_map(|f| u8::try_from(f).ok());
        let feeds = join_all(fields.map(|field| async move {
            self.provider
                .fetch_channel_feed(&device.feed, field, self.feed_limit)
                .await
                .map(|entries| to_raw_samples(field - 1, entries))
        }))
        .await;

        let mut raw = Vec::new();
        for feed in feeds {
            raw.extend(feed?);
        }
        Ok(raw)
    }

    /// Temperature is optional context; failures are logged, not propagated.
    async fn fetch_temperature(&self, device: &DeviceConfig) -> Option<Series> {
        let (source, field) = (self.temperature.as_ref()?, device.temperature_field?);
        let fetch = self.provider.fetch_channel_feed(source, field, self.feed_limit);

        let entries = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                tracing::warn!(device = %device.id, error = %e, "Temperature feed unavailable");
                return None;
            }
            Err(_) => {
                tracing::warn!(device = %device.id, "Temperature feed timed out");
                return None;
            }
        };

        let series = Series::load(&to_raw_samples(0, entries), 1).series;
        let series = transform::rename(&series, &[ChannelName::new(0, "temperature")]).ok()?;
        Some(downsample::reduce(
            &series,
            self.thinning.dense_window_hours,
            self.thinning.factor,
        ))
    }

    pub async fn snapshot(&self, device_id: &str) -> Result<Arc<DeviceSnapshot>, EngineError> {
        self.device(device_id)?;
        self.cache
            .get(device_id)
            .await
            .ok_or_else(|| EngineError::NotLoaded(device_id.to_string()))
    }

    pub async fn predict(
        &self,
        device_id: &str,
        request: PredictionRequest,
    ) -> anyhow::Result<ChannelPrediction> {
        let snapshot = self.snapshot(device_id).await?;
        let params = self.prediction.params(request.window)?;
        let config = request
            .config
            .unwrap_or_else(|| ChannelConfig::default_for(snapshot.reduced.channel_count()));

        if request.channel >= config.len() {
            return Err(EngineError::UnknownChannel {
                index: request.channel,
                channel_count: config.len(),
            }
            .into());
        }

        // A newer prediction for the same tube supersedes this one whatever its window.
        let ticket = self
            .gate
            .begin(format!("predict:{}:{}", device_id, request.channel));

        let working = pipeline::working_series(&snapshot.reduced, &config)?;
        let result = pipeline::predict_channel(
            &working,
            &config,
            request.channel,
            request.blank_offset,
            &params,
        )?;

        if !ticket.is_current() {
            return Err(EngineError::Superseded.into());
        }

        tracing::debug!(
            device = device_id,
            channel = request.channel,
            fitted = result.fit.result().is_some(),
            "Prediction computed"
        );
        Ok(result)
    }

    /// Cached series with the request's names and offsets applied. Without a
    /// config the placeholder names are kept and no offset is added.
    pub async fn working_series(
        &self,
        device_id: &str,
        config: Option<ChannelConfig>,
        reduced: bool,
    ) -> anyhow::Result<Series> {
        let snapshot = self.snapshot(device_id).await?;
        let base = if reduced {
            &snapshot.reduced
        } else {
            &snapshot.full
        };
        match config {
            Some(config) => Ok(pipeline::working_series(base, &config)?),
            None => Ok(base.clone()),
        }
    }

    pub async fn estimates(
        &self,
        device_id: &str,
        request: EstimateRequest,
    ) -> anyhow::Result<Vec<EstimateRow>> {
        let snapshot = self.snapshot(device_id).await?;
        let params = self.prediction.params(request.window)?;
        let config = request
            .config
            .unwrap_or_else(|| ChannelConfig::default_for(snapshot.reduced.channel_count()));

        Ok(pipeline::estimate_table(&snapshot.reduced, &config, &params)?)
    }
}

fn to_raw_samples(channel_id: u8, entries: Vec<FeedEntry>) -> Vec<RawSample> {
    entries
        .into_iter()
        .map(|e| RawSample {
            channel_id,
            timestamp: e.timestamp,
            value: e.value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fit::FitQuality;
    use crate::infrastructure::config::ThingSpeakSettings;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::{Notify, Semaphore};

    const OD_CHANNEL: u64 = 405675;
    const TEMP_CHANNEL: u64 = 890567;

    struct FakeProvider {
        failing: AtomicBool,
        delay: Option<Duration>,
        /// While set, fetches signal `entered` and wait for a `release` permit.
        holding: AtomicBool,
        entered: Notify,
        release: Semaphore,
        /// Added to every OD value, so consecutive refreshes are told apart.
        shift: std::sync::Mutex<f64>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                failing: AtomicBool::new(false),
                delay: None,
                holding: AtomicBool::new(false),
                entered: Notify::new(),
                release: Semaphore::new(0),
                shift: std::sync::Mutex::new(0.0),
            }
        }
    }

    #[async_trait]
    impl TelemetryProvider for FakeProvider {
        async fn fetch_channel_feed(
            &self,
            source: &FeedSource,
            field: u8,
            limit: usize,
        ) -> Result<Vec<FeedEntry>, ProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.holding.load(Ordering::SeqCst) {
                self.entered.notify_one();
                drop(self.release.acquire().await.unwrap());
            }
            let shift = *self.shift.lock().unwrap();
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProviderError::Unavailable("connection refused".into()));
            }

            let start = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc);
            // newest first, one reading per minute for six hours
            let entries = (0..360i64)
                .rev()
                .take(limit)
                .map(|minute| {
                    let hours = minute as f64 / 60.0;
                    let value = match (source.channel_id, field) {
                        (TEMP_CHANNEL, _) => 98.0,
                        (_, 1) => 0.02 * (0.4 * hours).exp() + shift,
                        _ => 0.1 + shift,
                    };
                    FeedEntry {
                        timestamp: (start + ChronoDuration::minutes(minute)).to_rfc3339(),
                        value: Some(format!("{:e}", value)),
                    }
                })
                .collect();
            Ok(entries)
        }
    }

    fn app_config() -> AppConfig {
        AppConfig {
            server: Default::default(),
            thingspeak: ThingSpeakSettings {
                feed_limit: 1000,
                ..Default::default()
            },
            devices: vec![DeviceConfig {
                id: "iodr-1".into(),
                name: "IODR #1".into(),
                feed: FeedSource {
                    channel_id: OD_CHANNEL,
                    read_api_key: "KEY".into(),
                },
                channel_count: 8,
                temperature_field: Some(1),
            }],
            temperature: Some(FeedSource {
                channel_id: TEMP_CHANNEL,
                read_api_key: "TEMP".into(),
            }),
            thinning: Default::default(),
            prediction: Default::default(),
        }
    }

    fn service(provider: Arc<FakeProvider>) -> GrowthService {
        GrowthService::new(provider, &app_config())
    }

    #[tokio::test]
    async fn test_refresh_loads_and_reduces() {
        let service = service(Arc::new(FakeProvider::new()));
        let summary = service.refresh("iodr-1").await.unwrap();

        assert_eq!(summary.rows, 360);
        assert_eq!(summary.rejected_rows, 0);
        assert!(summary.reduced_rows < summary.rows);
        assert!(summary.temperature_rows.is_some());

        let snapshot = service.snapshot("iodr-1").await.unwrap();
        assert_eq!(snapshot.full.channel_count(), 8);
        assert!(snapshot.full.timestamps().windows(2).all(|w| w[0] < w[1]));
        let temperature = snapshot.temperature.as_ref().unwrap();
        assert_eq!(temperature.channels()[0].display_name, "temperature");
    }

    #[tokio::test]
    async fn test_predict_channel_after_refresh() {
        let service = service(Arc::new(FakeProvider::new()));
        service.refresh("iodr-1").await.unwrap();

        let result = service
            .predict(
                "iodr-1",
                PredictionRequest {
                    channel: 0,
                    window: Some(FitWindow::new(-1.5, 0.0).unwrap()),
                    config: None,
                    blank_offset: 0.0,
                },
            )
            .await
            .unwrap();

        let fit = result.fit.result().unwrap();
        assert!((fit.slope - 0.4).abs() < 1e-6);
        assert_eq!(fit.quality, FitQuality::Good);
        // 0.02 e^(0.4 t) = 0.5 at t = ln(25) / 0.4
        let crossing = result.prediction.crossing.unwrap();
        assert!((crossing.elapsed_hours - 25f64.ln() / 0.4).abs() < 1e-4);
        assert_eq!(result.prediction.linear_curve.len(), 50);
    }

    #[tokio::test]
    async fn test_estimates_for_all_tubes() {
        let service = service(Arc::new(FakeProvider::new()));
        service.refresh("iodr-1").await.unwrap();

        let mut config = ChannelConfig::default_for(8);
        config.channels[0].name = "yeast".into();
        let rows = service
            .estimates(
                "iodr-1",
                EstimateRequest {
                    window: None,
                    config: Some(config),
                },
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].channel.display_name, "yeast");
        assert!(rows[0].estimate.crossing_time.is_some());
        // flat tubes never cross
        assert!(rows[1..].iter().all(|r| r.estimate.crossing_time.is_none()));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_good_snapshot() {
        let provider = Arc::new(FakeProvider::new());
        let service = service(provider.clone());
        service.refresh("iodr-1").await.unwrap();
        let before = service.snapshot("iodr-1").await.unwrap();

        provider.failing.store(true, Ordering::SeqCst);
        let err = service.refresh("iodr-1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Unavailable(_))
        ));

        let after = service.snapshot("iodr-1").await.unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(FakeProvider {
            delay: Some(Duration::from_millis(500)),
            ..FakeProvider::new()
        });
        let mut service = service(provider);
        service.fetch_timeout = Duration::from_millis(20);

        let err = service.refresh("iodr-1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::Timeout(_))
        ));
        assert_eq!(
            service.snapshot("iodr-1").await.unwrap_err(),
            EngineError::NotLoaded("iodr-1".into())
        );
    }

    #[tokio::test]
    async fn test_unknown_device_and_unloaded_device() {
        let service = service(Arc::new(FakeProvider::new()));
        let err = service.refresh("iodr-9").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::UnknownDevice("iodr-9".into()))
        );

        let err = service
            .estimates(
                "iodr-1",
                EstimateRequest {
                    window: None,
                    config: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EngineError>(),
            Some(&EngineError::NotLoaded("iodr-1".into()))
        );
    }

    #[tokio::test]
    async fn test_overtaken_refresh_is_discarded() {
        let provider = Arc::new(FakeProvider::new());
        let service = service(provider.clone());

        provider.holding.store(true, Ordering::SeqCst);
        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.refresh("iodr-1").await }
        });
        provider.entered.notified().await;

        provider.holding.store(false, Ordering::SeqCst);
        *provider.shift.lock().unwrap() = 0.05;
        service.refresh("iodr-1").await.unwrap();
        let newest = service.snapshot("iodr-1").await.unwrap();
        assert!((newest.full.value(0, 1).unwrap() - 0.15).abs() < 1e-12);

        provider.release.add_permits(1);
        let err = slow.await.unwrap().unwrap_err();
        assert_eq!(err.downcast_ref::<EngineError>(), Some(&EngineError::Superseded));

        let after = service.snapshot("iodr-1").await.unwrap();
        assert!(Arc::ptr_eq(&newest, &after));
        assert_eq!(service.gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_gate_is_empty_after_requests_finish() {
        let service = service(Arc::new(FakeProvider::new()));
        service.refresh("iodr-1").await.unwrap();

        for start in [-4.0, -3.5, -3.0, -2.5] {
            service
                .predict(
                    "iodr-1",
                    PredictionRequest {
                        channel: 0,
                        window: Some(FitWindow::new(start, 0.0).unwrap()),
                        config: None,
                        blank_offset: 0.0,
                    },
                )
                .await
                .unwrap();
        }
        let err = service
            .predict(
                "iodr-1",
                PredictionRequest {
                    channel: 42,
                    window: None,
                    config: None,
                    blank_offset: 0.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::UnknownChannel { index: 42, .. })
        ));

        assert_eq!(service.gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_working_series_carries_channel_names() {
        let service = service(Arc::new(FakeProvider::new()));
        service.refresh("iodr-1").await.unwrap();

        let plain = service.working_series("iodr-1", None, false).await.unwrap();
        assert_eq!(plain.len(), 360);
        assert_eq!(plain.channels()[0].display_name, "tube 1");

        let mut config = ChannelConfig::default_for(8);
        config.channels[1].name = "yeast".into();
        config.channels[1].offset = 0.1;
        let working = service
            .working_series("iodr-1", Some(config), true)
            .await
            .unwrap();
        let snapshot = service.snapshot("iodr-1").await.unwrap();
        assert_eq!(working.len(), snapshot.reduced.len());
        assert_eq!(working.channels()[1].display_name, "yeast");
        assert!((working.value(0, 1).unwrap() - 0.2).abs() < 1e-12);
    }
}
