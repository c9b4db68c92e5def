use crate::application::telemetry_provider::FeedSource;
use crate::domain::error::EngineError;
use crate::domain::fit::{AnchorPolicy, FitWindow};
use crate::domain::pipeline::PredictionParams;
use crate::domain::prediction::DEFAULT_CURVE_SAMPLES;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub thingspeak: ThingSpeakSettings,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Shared feed where device N reports its temperature as field N.
    #[serde(default)]
    pub temperature: Option<FeedSource>,
    #[serde(default)]
    pub thinning: ThinningSettings,
    #[serde(default)]
    pub prediction: PredictionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThingSpeakSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Entries requested per field on each refresh.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,
}

impl Default for ThingSpeakSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            feed_limit: default_feed_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    pub feed: FeedSource,
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    /// Field of the shared temperature feed that belongs to this device.
    pub temperature_field: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThinningSettings {
    #[serde(default = "default_dense_window_hours")]
    pub dense_window_hours: f64,
    #[serde(default = "default_thinning_factor")]
    pub factor: u32,
}

impl Default for ThinningSettings {
    fn default() -> Self {
        Self {
            dense_window_hours: default_dense_window_hours(),
            factor: default_thinning_factor(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictionSettings {
    #[serde(default = "default_window_start")]
    pub window_start_hours: f64,
    #[serde(default)]
    pub window_end_hours: f64,
    #[serde(default = "default_display_horizon")]
    pub display_horizon_hours: f64,
    #[serde(default = "default_curve_samples")]
    pub curve_samples: usize,
    #[serde(default)]
    pub anchor_policy: AnchorPolicy,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            window_start_hours: default_window_start(),
            window_end_hours: 0.0,
            display_horizon_hours: default_display_horizon(),
            curve_samples: default_curve_samples(),
            anchor_policy: AnchorPolicy::default(),
        }
    }
}

impl PredictionSettings {
    /// Engine parameters for one request; `window` overrides the configured default.
    pub fn params(&self, window: Option<FitWindow>) -> Result<PredictionParams, EngineError> {
        let window = match window {
            Some(w) => w.validated()?,
            None => FitWindow::new(self.window_start_hours, self.window_end_hours)?,
        };
        Ok(PredictionParams {
            window,
            anchor_policy: self.anchor_policy,
            display_horizon_hours: self.display_horizon_hours,
            curve_samples: self.curve_samples,
        })
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_url() -> String {
    "https://api.thingspeak.com/channels".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_feed_limit() -> usize {
    1000
}

fn default_channel_count() -> usize {
    8
}

fn default_dense_window_hours() -> f64 {
    2.0
}

fn default_thinning_factor() -> u32 {
    10
}

fn default_window_start() -> f64 {
    -5.0
}

fn default_display_horizon() -> f64 {
    12.0
}

fn default_curve_samples() -> usize {
    DEFAULT_CURVE_SAMPLES
}

/// Reads `config/growth.toml` (optional) and `GROWTH__*` environment overrides.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/growth").required(false))
        .add_source(
            config::Environment::with_prefix("GROWTH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
