// Log-linear growth fit over a window of recent readings
use crate::domain::error::EngineError;
use crate::domain::log_series::LogSeries;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Correlation above which a fit counts as good.
pub const GOOD_FIT_R: f64 = 0.9;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Hours relative to the newest reading, e.g. `[-5, 0]` for the last five hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitWindow {
    pub start_hours: f64,
    pub end_hours: f64,
}

impl FitWindow {
    pub fn new(start_hours: f64, end_hours: f64) -> Result<Self, EngineError> {
        let valid = start_hours.is_finite()
            && end_hours.is_finite()
            && start_hours <= end_hours
            && end_hours <= 0.0;
        if !valid {
            return Err(EngineError::InvalidWindow {
                start: start_hours,
                end: end_hours,
            });
        }
        Ok(Self {
            start_hours,
            end_hours,
        })
    }

    /// Re-checks a window that arrived through deserialization.
    pub fn validated(self) -> Result<Self, EngineError> {
        Self::new(self.start_hours, self.end_hours)
    }

    pub fn contains(&self, hours: f64) -> bool {
        hours >= self.start_hours && hours <= self.end_hours
    }
}

impl Default for FitWindow {
    fn default() -> Self {
        Self {
            start_hours: -5.0,
            end_hours: 0.0,
        }
    }
}

/// Zero point of the regression's time axis. Crossing times are mapped back
/// to instants from the same point.
///
/// No variant fits against one zero point and maps back from another; mixing
/// them shifts every crossing by the span of the series. The fit window is
/// always measured back from the newest reading whichever zero point is used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Hours since the first reading of the working series.
    #[default]
    FirstReading,
    /// Hours relative to the newest reading (always <= 0 inside the window).
    LastReading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitQuality {
    Good,
    Poor,
}

impl FitQuality {
    pub fn from_r(r_value: f64) -> Self {
        if r_value > GOOD_FIT_R {
            FitQuality::Good
        } else {
            FitQuality::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_value: f64,
    pub quality: FitQuality,
    pub window: FitWindow,
    pub anchor_policy: AnchorPolicy,
    /// Instant at which the regression's time axis is zero.
    pub origin: DateTime<Utc>,
    /// Newest reading; the window is measured back from here.
    pub anchor: DateTime<Utc>,
    pub points_used: usize,
}

impl FitResult {
    /// Position of the newest reading on the regression's time axis.
    pub fn anchor_hours(&self) -> f64 {
        hours_between(self.origin, self.anchor)
    }

    /// Position of the window start on the regression's time axis.
    pub fn window_start_hours(&self) -> f64 {
        self.anchor_hours() + self.window.start_hours
    }

    pub fn ln_at(&self, hours: f64) -> f64 {
        self.slope * hours + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoFitReason {
    /// Fewer than two points with a defined logarithm inside the window.
    InsufficientData,
    /// All usable points share one timestamp.
    DegenerateWindow,
}

/// Outcome of a fit. A sparse or misplaced window is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Fit {
    Fitted(FitResult),
    NoFit {
        reason: NoFitReason,
        points_in_window: usize,
    },
}

impl Fit {
    pub fn result(&self) -> Option<&FitResult> {
        match self {
            Fit::Fitted(result) => Some(result),
            Fit::NoFit { .. } => None,
        }
    }
}

/// Ordinary least squares of ln(value) against elapsed hours for the points of
/// `log_series` inside `window`.
pub fn fit(log_series: &LogSeries, window: FitWindow, anchor_policy: AnchorPolicy) -> Fit {
    let (Some(first), Some(anchor)) = (log_series.first_timestamp(), log_series.last_timestamp())
    else {
        return Fit::NoFit {
            reason: NoFitReason::InsufficientData,
            points_in_window: 0,
        };
    };

    let origin = match anchor_policy {
        AnchorPolicy::FirstReading => log_series.series_start.unwrap_or(first),
        AnchorPolicy::LastReading => anchor,
    };

    let (xs, ys): (Vec<f64>, Vec<f64>) = log_series
        .points
        .iter()
        .filter(|p| window.contains(hours_between(anchor, p.timestamp)))
        .filter_map(|p| p.ln_value.map(|ln| (hours_between(origin, p.timestamp), ln)))
        .unzip();

    let Some((slope, intercept, r_value)) = regress(&xs, &ys) else {
        let reason = if xs.len() < 2 {
            NoFitReason::InsufficientData
        } else {
            NoFitReason::DegenerateWindow
        };
        tracing::debug!(
            channel = log_series.channel.index,
            points = xs.len(),
            ?reason,
            "No fit for window"
        );
        return Fit::NoFit {
            reason,
            points_in_window: xs.len(),
        };
    };

    Fit::Fitted(FitResult {
        slope,
        intercept,
        r_value,
        quality: FitQuality::from_r(r_value),
        window,
        anchor_policy,
        origin,
        anchor,
        points_used: xs.len(),
    })
}

/// Returns (slope, intercept, pearson r), or `None` when fewer than two points
/// are given or the abscissae do not vary.
fn regress(xs: &[f64], ys: &[f64]) -> Option<(f64, f64, f64)> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    if ys.iter().all(|y| *y == ys[0]) && xs.iter().any(|x| *x != xs[0]) {
        return Some((0.0, ys[0], 0.0));
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx <= f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let r_value = if syy > 0.0 {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    Some((slope, intercept, r_value))
}

pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MS_PER_HOUR
}
