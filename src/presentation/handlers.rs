// HTTP request handlers
use crate::application::growth_service::{EstimateRequest, PredictionRequest, RefreshSummary};
use crate::domain::channel::ChannelConfig;
use crate::domain::error::{EngineError, ProviderError};
use crate::domain::pipeline::{ChannelPrediction, EstimateRow};
use crate::domain::series::Series;
use crate::infrastructure::csv_export::{estimates_to_csv, series_to_csv};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct SeriesQuery {
    pub reduced: Option<bool>,
}

/// Body of a named series download; omitted fields export the full raw series.
#[derive(Deserialize)]
pub struct SeriesExportRequest {
    pub config: Option<ChannelConfig>,
    #[serde(default)]
    pub reduced: bool,
}

#[derive(Serialize)]
pub struct DeviceView {
    pub id: String,
    pub name: String,
    pub channel_count: usize,
}

/// Maps engine and provider failures onto HTTP statuses.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<EngineError>() {
            return match err {
                EngineError::UnknownDevice(_) | EngineError::NotLoaded(_) => StatusCode::NOT_FOUND,
                EngineError::Superseded => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
        }
        match self.0.downcast_ref::<ProviderError>() {
            Some(ProviderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Some(ProviderError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }
        let body = serde_json::json!({ "error": format!("{:#}", self.0) });
        (status, Json(body)).into_response()
    }
}

fn csv_response(filename: String, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceView>> {
    let devices = state
        .growth_service
        .devices()
        .iter()
        .map(|d| DeviceView {
            id: d.id.clone(),
            name: d.name.clone(),
            channel_count: d.channel_count,
        })
        .collect();
    Json(devices)
}

/// Pull the latest telemetry for a device
pub async fn refresh_device(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshSummary>, ApiError> {
    Ok(Json(state.growth_service.refresh(&id).await?))
}

pub async fn get_series(
    Path(id): Path<String>,
    Query(query): Query<SeriesQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Series>, ApiError> {
    let snapshot = state.growth_service.snapshot(&id).await?;
    let series = if query.reduced.unwrap_or(true) {
        snapshot.reduced.clone()
    } else {
        snapshot.full.clone()
    };
    Ok(Json(series))
}

pub async fn get_temperature(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<Series>>, ApiError> {
    let snapshot = state.growth_service.snapshot(&id).await?;
    Ok(Json(snapshot.temperature.clone()))
}

pub async fn predict(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<ChannelPrediction>, ApiError> {
    Ok(Json(state.growth_service.predict(&id, request).await?))
}

pub async fn estimates(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<Vec<EstimateRow>>, ApiError> {
    Ok(Json(state.growth_service.estimates(&id, request).await?))
}

/// Full (unreduced) series as CSV
pub async fn series_csv(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let series = state.growth_service.working_series(&id, None, false).await?;
    Ok(csv_response(format!("{}.csv", id), series_to_csv(&series)))
}

/// Series as CSV with the request's channel names and offsets applied
pub async fn working_series_csv(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SeriesExportRequest>,
) -> Result<Response, ApiError> {
    let series = state
        .growth_service
        .working_series(&id, request.config, request.reduced)
        .await?;
    Ok(csv_response(format!("{}.csv", id), series_to_csv(&series)))
}

pub async fn estimates_csv(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<EstimateRequest>,
) -> Result<Response, ApiError> {
    let rows = state.growth_service.estimates(&id, request).await?;
    Ok(csv_response(
        format!("{}_estimates.csv", id),
        estimates_to_csv(&rows),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases: Vec<(anyhow::Error, StatusCode)> = vec![
            (EngineError::UnknownDevice("x".into()).into(), StatusCode::NOT_FOUND),
            (EngineError::NotLoaded("x".into()).into(), StatusCode::NOT_FOUND),
            (EngineError::InvalidTarget(-1.0).into(), StatusCode::BAD_REQUEST),
            (EngineError::Superseded.into(), StatusCode::CONFLICT),
            (ProviderError::Timeout(10).into(), StatusCode::GATEWAY_TIMEOUT),
            (
                anyhow::Error::from(ProviderError::Unavailable("down".into())).context("refresh"),
                StatusCode::BAD_GATEWAY,
            ),
            (anyhow::anyhow!("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
