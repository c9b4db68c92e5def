// Multi-channel time series built from raw telemetry rows
use crate::domain::channel::ChannelName;
use crate::domain::error::MalformedInputError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One feed entry as delivered by the telemetry source, still in text form.
/// `value` is `None` when the feed reported no value for the field.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub channel_id: u8,
    pub timestamp: String,
    pub value: Option<String>,
}

impl RawSample {
    #[cfg(test)]
    pub fn new(channel_id: u8, timestamp: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            channel_id,
            timestamp: timestamp.into(),
            value: value.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub channel_id: u8,
    pub value: Option<f64>,
}

impl Reading {
    pub fn parse(raw: &RawSample, channel_count: usize) -> Result<Self, MalformedInputError> {
        if raw.channel_id as usize >= channel_count {
            return Err(MalformedInputError::Channel {
                channel_id: raw.channel_id,
                channel_count,
            });
        }

        let timestamp = DateTime::parse_from_rfc3339(raw.timestamp.trim())
            .map_err(|_| MalformedInputError::Timestamp {
                channel_id: raw.channel_id,
                timestamp: raw.timestamp.clone(),
            })?
            .with_timezone(&Utc);

        let value = match raw.value.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(v),
                _ => {
                    return Err(MalformedInputError::Value {
                        channel_id: raw.channel_id,
                        timestamp: raw.timestamp.clone(),
                        value: text.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            timestamp,
            channel_id: raw.channel_id,
            value,
        })
    }
}

/// Timestamp-indexed table with one optional value per channel per row.
///
/// Timestamps are strictly increasing and the channel set never changes for
/// the lifetime of a value; transforms hand back a new `Series`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    timestamps: Vec<DateTime<Utc>>,
    channels: Vec<ChannelName>,
    /// Column-major: `values[channel][row]`.
    values: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub series: Series,
    pub rejected: Vec<MalformedInputError>,
}

impl Series {
    #[cfg(test)]
    pub fn empty(channel_count: usize) -> Self {
        Self {
            timestamps: Vec::new(),
            channels: (0..channel_count).map(ChannelName::placeholder).collect(),
            values: vec![Vec::new(); channel_count],
        }
    }

    /// Aligns raw samples into one row per distinct timestamp.
    /// Malformed rows are dropped and reported, never fatal.
    ///
    /// When a (timestamp, channel) pair repeats, the last sample carrying a
    /// value wins; a later empty sample does not erase an earlier value.
    pub fn load(raw_samples: &[RawSample], channel_count: usize) -> LoadOutcome {
        let mut rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>> = BTreeMap::new();
        let mut rejected = Vec::new();

        for raw in raw_samples {
            match Reading::parse(raw, channel_count) {
                Ok(reading) => {
                    let row = rows
                        .entry(reading.timestamp)
                        .or_insert_with(|| vec![None; channel_count]);
                    if reading.value.is_some() {
                        row[reading.channel_id as usize] = reading.value;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed telemetry row");
                    rejected.push(e);
                }
            }
        }

        let channels = (0..channel_count).map(ChannelName::placeholder).collect();
        let series = Self::from_rows(channels, rows.into_iter().collect());

        tracing::debug!(
            rows = series.len(),
            rejected = rejected.len(),
            "Loaded telemetry series"
        );

        LoadOutcome { series, rejected }
    }

    /// Builds a series from rows that are already sorted and deduplicated.
    pub(crate) fn from_rows(
        channels: Vec<ChannelName>,
        rows: Vec<(DateTime<Utc>, Vec<Option<f64>>)>,
    ) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
        let mut values = vec![Vec::with_capacity(rows.len()); channels.len()];
        let mut timestamps = Vec::with_capacity(rows.len());
        for (timestamp, row) in rows {
            timestamps.push(timestamp);
            for (column, value) in values.iter_mut().zip(row) {
                column.push(value);
            }
        }
        Self {
            timestamps,
            channels,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[ChannelName] {
        &self.channels
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    pub fn column(&self, index: usize) -> Option<&[Option<f64>]> {
        self.values.get(index).map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, channel: usize) -> Option<f64> {
        self.values.get(channel)?.get(row).copied().flatten()
    }

    /// All channel values of one row, in channel order.
    pub fn row(&self, row: usize) -> Vec<Option<f64>> {
        (0..self.channels.len()).map(|c| self.value(row, c)).collect()
    }

    /// Keeps the rows for which `keep` returns true.
    pub(crate) fn retain_rows(&self, mut keep: impl FnMut(usize, DateTime<Utc>) -> bool) -> Self {
        let kept: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(i, t)| keep(*i, **t))
            .map(|(i, _)| i)
            .collect();

        Self {
            timestamps: kept.iter().map(|&i| self.timestamps[i]).collect(),
            channels: self.channels.clone(),
            values: self
                .values
                .iter()
                .map(|column| kept.iter().map(|&i| column[i]).collect())
                .collect(),
        }
    }

    pub(crate) fn with_channels(&self, channels: Vec<ChannelName>) -> Self {
        debug_assert_eq!(channels.len(), self.channels.len());
        Self {
            timestamps: self.timestamps.clone(),
            channels,
            values: self.values.clone(),
        }
    }

    pub(crate) fn map_columns(&self, mut f: impl FnMut(usize, f64) -> f64) -> Self {
        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(channel, column)| column.iter().map(|v| v.map(|v| f(channel, v))).collect())
            .collect();
        Self {
            timestamps: self.timestamps.clone(),
            channels: self.channels.clone(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_aligns_channels_by_timestamp() {
        let raw = vec![
            RawSample::new(1, "2024-03-01T10:01:00Z", Some("0.21")),
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.10")),
            RawSample::new(1, "2024-03-01T10:00:00Z", Some("0.20")),
            RawSample::new(0, "2024-03-01T10:01:00Z", Some("0.11")),
        ];

        let outcome = Series::load(&raw, 2);
        let series = outcome.series;

        assert!(outcome.rejected.is_empty());
        assert_eq!(series.len(), 2);
        assert_eq!(series.channel_count(), 2);
        assert_eq!(series.row(0), vec![Some(0.10), Some(0.20)]);
        assert_eq!(series.row(1), vec![Some(0.11), Some(0.21)]);
        assert!(series.timestamps()[0] < series.timestamps()[1]);
        assert_eq!(series.channels()[1].display_name, "tube 2");
    }

    #[test]
    fn test_load_drops_malformed_rows() {
        let raw = vec![
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.10")),
            RawSample::new(0, "yesterday", Some("0.11")),
            RawSample::new(1, "2024-03-01T10:00:00Z", Some("cloudy")),
            RawSample::new(9, "2024-03-01T10:00:00Z", Some("0.3")),
            RawSample::new(1, "2024-03-01T10:02:00Z", None),
        ];

        let outcome = Series::load(&raw, 2);

        assert_eq!(outcome.rejected.len(), 3);
        assert!(matches!(
            outcome.rejected[0],
            MalformedInputError::Timestamp { .. }
        ));
        assert!(matches!(outcome.rejected[1], MalformedInputError::Value { .. }));
        assert!(matches!(outcome.rejected[2], MalformedInputError::Channel { .. }));
        assert_eq!(outcome.series.len(), 2);
        assert_eq!(outcome.series.row(0), vec![Some(0.10), None]);
        assert_eq!(outcome.series.row(1), vec![None, None]);
    }

    #[test]
    fn test_retain_rows_keeps_channels() {
        let raw: Vec<RawSample> = (0..4)
            .map(|m| RawSample::new(0, format!("2024-03-01T10:0{}:00Z", m), Some("1.0")))
            .collect();
        let series = Series::load(&raw, 1).series;
        let even = series.retain_rows(|i, _| i % 2 == 0);
        assert_eq!(even.len(), 2);
        assert_eq!(even.channels(), series.channels());
        assert_eq!(even.timestamps()[1], series.timestamps()[2]);
    }

    #[test]
    fn test_duplicate_samples_last_value_wins() {
        let raw = vec![
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.10")),
            RawSample::new(1, "2024-03-01T10:00:00Z", Some("0.20")),
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.30")),
        ];

        let outcome = Series::load(&raw, 2);

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.series.row(0), vec![Some(0.30), Some(0.20)]);
    }

    #[test]
    fn test_trailing_empty_duplicate_keeps_value() {
        let raw = vec![
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.10")),
            RawSample::new(0, "2024-03-01T10:00:00Z", Some("0.30")),
            RawSample::new(0, "2024-03-01T10:00:00Z", None),
            RawSample::new(0, "2024-03-01T10:00:00+00:00", Some("")),
        ];

        let series = Series::load(&raw, 1).series;

        assert_eq!(series.len(), 1);
        assert_eq!(series.row(0), vec![Some(0.30)]);
    }
}
