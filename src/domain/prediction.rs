// Target crossing time and predicted growth curves from a fit
use crate::domain::fit::{Fit, FitQuality, FitResult};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DEFAULT_CURVE_SAMPLES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub time: DateTime<Utc>,
    /// Position on the fit's time axis.
    pub elapsed_hours: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Crossing {
    pub time: DateTime<Utc>,
    pub elapsed_hours: f64,
    /// The modeled curve reached the target before the selected window began.
    pub in_past: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub target: f64,
    pub crossing: Option<Crossing>,
    pub r_value: Option<f64>,
    pub quality: Option<FitQuality>,
    /// `exp(slope * t + intercept)`
    pub linear_curve: Vec<CurvePoint>,
    /// `slope * t + intercept`
    pub log_curve: Vec<CurvePoint>,
}

impl Prediction {
    fn empty(target: f64) -> Self {
        Self {
            target,
            crossing: None,
            r_value: None,
            quality: None,
            linear_curve: Vec::new(),
            log_curve: Vec::new(),
        }
    }
}

/// Per-channel summary row: when the target is reached and how well the line fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub crossing_time: Option<DateTime<Utc>>,
    pub r_value: Option<f64>,
}

impl Estimate {
    pub fn from_prediction(prediction: &Prediction) -> Self {
        Self {
            crossing_time: prediction.crossing.map(|c| c.time),
            r_value: prediction.r_value,
        }
    }
}

/// Solves the fitted line for `ln(target)` and samples the model from the start
/// of the fit window up to that crossing.
///
/// A zero slope or an unusable target yields no crossing; the curve then runs
/// to `display_horizon_hours` past the newest reading. Crossings before the
/// window start are reported and flagged rather than suppressed.
pub fn predict_crossing(
    fit: &Fit,
    target: f64,
    display_horizon_hours: f64,
    samples: usize,
) -> Prediction {
    let Some(result) = fit.result() else {
        return Prediction::empty(target);
    };

    let window_start = result.window_start_hours();
    let crossing_hours = crossing_hours(result, target);

    let crossing = crossing_hours.and_then(|hours| {
        instant_at(result.origin, hours).map(|time| Crossing {
            time,
            elapsed_hours: hours,
            in_past: hours < window_start,
        })
    });

    let curve_end = match crossing {
        Some(c) => c.elapsed_hours,
        None => result.anchor_hours() + display_horizon_hours.max(0.0),
    };

    let ts = linspace(window_start, curve_end, samples);
    let log_curve: Vec<CurvePoint> = ts
        .iter()
        .filter_map(|&t| {
            instant_at(result.origin, t).map(|time| CurvePoint {
                time,
                elapsed_hours: t,
                value: result.ln_at(t),
            })
        })
        .collect();
    let linear_curve = log_curve
        .iter()
        .map(|p| CurvePoint {
            value: p.value.exp(),
            ..*p
        })
        .collect();

    if crossing.is_none() {
        tracing::debug!(target, slope = result.slope, "Fitted line never reaches target");
    }

    Prediction {
        target,
        crossing,
        r_value: Some(result.r_value),
        quality: Some(result.quality),
        linear_curve,
        log_curve,
    }
}

fn crossing_hours(result: &FitResult, target: f64) -> Option<f64> {
    if !target.is_finite() || target <= 0.0 || result.slope == 0.0 {
        return None;
    }
    let hours = (target.ln() - result.intercept) / result.slope;
    hours.is_finite().then_some(hours)
}

fn instant_at(origin: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    let ms = hours * 3_600_000.0;
    if !ms.is_finite() || ms.abs() > i64::MAX as f64 {
        return None;
    }
    let offset = Duration::try_milliseconds(ms.round() as i64)?;
    origin.checked_add_signed(offset)
}

fn linspace(start: f64, end: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
