// Rename and offset transforms over a working series
use crate::domain::channel::ChannelName;
use crate::domain::error::EngineError;
use crate::domain::series::Series;

/// Relabels channels by index. Values are never touched; a name pointing at an
/// index the series does not have is rejected.
pub fn rename(series: &Series, names: &[ChannelName]) -> Result<Series, EngineError> {
    let mut channels = series.channels().to_vec();
    for name in names {
        let slot = channels
            .get_mut(name.index)
            .ok_or(EngineError::UnknownChannel {
                index: name.index,
                channel_count: series.channel_count(),
            })?;
        *slot = slot.renamed(&name.display_name);
    }
    Ok(series.with_channels(channels))
}

/// Adds each channel's offset to every value of that channel.
///
/// Offsets are absolute, not cumulative: callers apply them to the reduced base
/// series each time. Results at or below zero stay in the series; the log
/// transform treats them as undefined.
pub fn apply_offset(series: &Series, offsets: &[f64]) -> Result<Series, EngineError> {
    if offsets.len() != series.channel_count() {
        return Err(EngineError::ChannelCountMismatch {
            expected: series.channel_count(),
            actual: offsets.len(),
        });
    }
    Ok(series.map_columns(|channel, value| value + offsets[channel]))
}
