// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::growth_service::GrowthService;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::thingspeak_provider::ThingSpeakProvider;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    estimates, estimates_csv, get_series, get_temperature, health_check, list_devices, predict,
    refresh_device, series_csv, working_series_csv,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config()?;

    // Create provider (infrastructure layer)
    let provider = Arc::new(ThingSpeakProvider::new(
        config.thingspeak.base_url.clone(),
        Duration::from_secs(config.thingspeak.timeout_secs),
    )?);

    // Create services (application layer)
    let growth_service = GrowthService::new(provider, &config);
    let state = Arc::new(AppState { growth_service });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/devices", get(list_devices))
        .route("/devices/:id/refresh", post(refresh_device))
        .route("/devices/:id/series", get(get_series))
        .route(
            "/devices/:id/series.csv",
            get(series_csv).post(working_series_csv),
        )
        .route("/devices/:id/temperature", get(get_temperature))
        .route("/devices/:id/prediction", post(predict))
        .route("/devices/:id/estimates", post(estimates))
        .route("/devices/:id/estimates.csv", post(estimates_csv))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!(
        %addr,
        devices = config.devices.len(),
        "Starting growth-telemetry service"
    );

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
