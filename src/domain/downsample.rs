// Thinning of older history while keeping recent readings at full resolution
use crate::domain::series::Series;
use chrono::{DateTime, Duration, Utc};

/// Spacing assumed when the dense region is too short to measure one.
pub const FALLBACK_SAMPLE_INTERVAL_MS: i64 = 60_000;

/// Reduces `series` to a dense recent window plus a sparse long history.
///
/// Rows within `dense_window_hours` of the last timestamp are kept as-is. Older
/// rows are thinned to roughly one in `thinning_factor`: time is cut into
/// absolute buckets of `thinning_factor` sample intervals and only the earliest
/// row of each bucket survives. Bucket edges depend on epoch time, not row
/// position, so reducing an already reduced series changes nothing.
pub fn reduce(series: &Series, dense_window_hours: f64, thinning_factor: u32) -> Series {
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return series.clone();
    };
    if thinning_factor <= 1 || !dense_window_hours.is_finite() || dense_window_hours < 0.0 {
        return series.clone();
    }

    let dense_window = Duration::milliseconds((dense_window_hours * 3_600_000.0).round() as i64);
    if last - first <= dense_window {
        return series.clone();
    }
    let cutoff = last - dense_window;

    let interval_ms = dense_interval_ms(series.timestamps(), cutoff);
    let bucket_ms = interval_ms.saturating_mul(thinning_factor as i64).max(1);

    let mut last_bucket: Option<i64> = None;
    let reduced = series.retain_rows(|_, timestamp| {
        if timestamp >= cutoff {
            return true;
        }
        let bucket = timestamp.timestamp_millis().div_euclid(bucket_ms);
        if last_bucket == Some(bucket) {
            return false;
        }
        last_bucket = Some(bucket);
        true
    });

    tracing::debug!(
        before = series.len(),
        after = reduced.len(),
        interval_ms,
        thinning_factor,
        "Reduced series"
    );

    reduced
}

/// Median spacing of the rows at or after `cutoff`. Those rows are never
/// thinned, so the value is stable across repeated reductions.
fn dense_interval_ms(timestamps: &[DateTime<Utc>], cutoff: DateTime<Utc>) -> i64 {
    let start = timestamps.partition_point(|t| *t < cutoff);
    let mut gaps: Vec<i64> = timestamps[start..]
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds())
        .collect();
    if gaps.is_empty() {
        return FALLBACK_SAMPLE_INTERVAL_MS;
    }
    gaps.sort_unstable();
    gaps[gaps.len() / 2].max(1)
}
