// Natural-log view of a single channel, aligned with its linear values
use crate::domain::channel::ChannelName;
use crate::domain::error::EngineError;
use crate::domain::series::Series;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    /// `None` when `value` is missing or not above zero.
    pub ln_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSeries {
    pub channel: ChannelName,
    pub points: Vec<LogPoint>,
    /// Points whose logarithm is undefined (value <= 0 or missing).
    pub undefined_count: usize,
    /// First timestamp of the working series the channel was taken from.
    pub series_start: Option<DateTime<Utc>>,
}

impl LogSeries {
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }
}

pub fn to_log_series(series: &Series, channel_index: usize) -> Result<LogSeries, EngineError> {
    let column = series
        .column(channel_index)
        .ok_or(EngineError::UnknownChannel {
            index: channel_index,
            channel_count: series.channel_count(),
        })?;

    let mut undefined_count = 0;
    let points: Vec<LogPoint> = series
        .timestamps()
        .iter()
        .zip(column)
        .map(|(&timestamp, &value)| {
            let ln_value = value.filter(|v| *v > 0.0).map(f64::ln);
            if ln_value.is_none() {
                undefined_count += 1;
            }
            LogPoint {
                timestamp,
                value,
                ln_value,
            }
        })
        .collect();

    if undefined_count > 0 {
        tracing::debug!(
            channel = channel_index,
            undefined_count,
            "Excluded points with undefined logarithm"
        );
    }

    Ok(LogSeries {
        channel: series.channels()[channel_index].clone(),
        points,
        undefined_count,
        series_start: series.first_timestamp(),
    })
}
