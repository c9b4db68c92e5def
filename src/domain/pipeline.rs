// Per-request recomputation: transforms, log view, fit and prediction
use crate::domain::channel::{ChannelConfig, ChannelName};
use crate::domain::error::EngineError;
use crate::domain::fit::{fit, AnchorPolicy, Fit, FitQuality, FitWindow};
use crate::domain::log_series::{to_log_series, LogSeries};
use crate::domain::prediction::{predict_crossing, Estimate, Prediction, DEFAULT_CURVE_SAMPLES};
use crate::domain::series::Series;
use crate::domain::transform::{apply_offset, rename};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionParams {
    pub window: FitWindow,
    pub anchor_policy: AnchorPolicy,
    pub display_horizon_hours: f64,
    pub curve_samples: usize,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self {
            window: FitWindow::default(),
            anchor_policy: AnchorPolicy::default(),
            display_horizon_hours: 12.0,
            curve_samples: DEFAULT_CURVE_SAMPLES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelPrediction {
    pub channel: ChannelName,
    pub target: f64,
    pub offset: f64,
    pub log_series: LogSeries,
    pub fit: Fit,
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateRow {
    pub channel: ChannelName,
    pub target: f64,
    pub offset: f64,
    pub estimate: Estimate,
    pub quality: Option<FitQuality>,
}

/// Applies the config's names and offsets to the reduced base series.
/// Always starts from `base`, so offsets never stack across requests.
pub fn working_series(base: &Series, config: &ChannelConfig) -> Result<Series, EngineError> {
    config.validate(base.channel_count())?;
    let renamed = rename(base, &config.names())?;
    apply_offset(&renamed, &config.offsets())
}

/// Runs the fit for one channel of an already transformed series.
/// `extra_offset` shifts only this channel, on top of its configured offset.
pub fn predict_channel(
    working: &Series,
    config: &ChannelConfig,
    channel: usize,
    extra_offset: f64,
    params: &PredictionParams,
) -> Result<ChannelPrediction, EngineError> {
    let target = config.target(channel).ok_or(EngineError::UnknownChannel {
        index: channel,
        channel_count: config.len(),
    })?;

    let shifted;
    let source = if extra_offset != 0.0 {
        let mut offsets = vec![0.0; working.channel_count()];
        if let Some(slot) = offsets.get_mut(channel) {
            *slot = extra_offset;
        }
        shifted = apply_offset(working, &offsets)?;
        &shifted
    } else {
        working
    };

    let log_series = to_log_series(source, channel)?;
    let fit = fit(&log_series, params.window, params.anchor_policy);
    let prediction = predict_crossing(
        &fit,
        target,
        params.display_horizon_hours,
        params.curve_samples,
    );

    Ok(ChannelPrediction {
        channel: log_series.channel.clone(),
        target,
        offset: config.channels[channel].offset + extra_offset,
        log_series,
        fit,
        prediction,
    })
}

/// Crossing estimate and fit quality for every channel, each against its own target.
pub fn estimate_table(
    base: &Series,
    config: &ChannelConfig,
    params: &PredictionParams,
) -> Result<Vec<EstimateRow>, EngineError> {
    let working = working_series(base, config)?;
    (0..working.channel_count())
        .map(|channel| {
            let result = predict_channel(&working, config, channel, 0.0, params)?;
            Ok(EstimateRow {
                channel: result.channel,
                target: result.target,
                offset: result.offset,
                estimate: Estimate::from_prediction(&result.prediction),
                quality: result.prediction.quality,
            })
        })
        .collect()
}
