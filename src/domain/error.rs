// Typed errors raised by the growth engine and the telemetry provider
use thiserror::Error;

/// A raw telemetry row that could not be turned into a reading.
/// Row-level only: the load that produced it keeps going.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedInputError {
    #[error("unparseable timestamp {timestamp:?} on channel {channel_id}")]
    Timestamp { channel_id: u8, timestamp: String },
    #[error("non-numeric value {value:?} on channel {channel_id} at {timestamp}")]
    Value {
        channel_id: u8,
        timestamp: String,
        value: String,
    },
    #[error("channel {channel_id} is outside the {channel_count} channels of this series")]
    Channel { channel_id: u8, channel_count: usize },
}

/// Whole-feed failures from the telemetry source.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("telemetry provider unavailable: {0}")]
    Unavailable(String),
    #[error("telemetry fetch timed out after {0}s")]
    Timeout(u64),
}

/// Caller mistakes rejected by the engine before any computation runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("unknown channel index {index} (series has {channel_count} channels)")]
    UnknownChannel { index: usize, channel_count: usize },
    #[error("invalid window [{start}, {end}]: expected start <= end <= 0")]
    InvalidWindow { start: f64, end: f64 },
    #[error("invalid target {0}: must be a finite value above zero")]
    InvalidTarget(f64),
    #[error("expected {expected} per-channel entries, got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },
    #[error("unknown device {0}")]
    UnknownDevice(String),
    #[error("no telemetry loaded yet for device {0}")]
    NotLoaded(String),
    #[error("request superseded by a newer one")]
    Superseded,
}
