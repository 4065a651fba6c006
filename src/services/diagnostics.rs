//! In-sample fit quality, trend classification and confidence scoring.

use serde::{Deserialize, Serialize};

use crate::{
    errors::{ForecastResultExt, PipelineError},
    ml::{FittedModel, Prediction},
    models::{CleanedSeries, TrendStatus},
};

pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.95;
/// Rows averaged at each end of the forecast when measuring trend drift.
pub const TREND_WINDOW: usize = 30;
pub const TREND_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelDiagnostics {
    pub mae: f64,
    pub mape: f64,
    pub trend_status: TrendStatus,
    pub confidence_score: f64,
}

/// Scores an already fitted model.
///
/// `longest_forecast` is the full prediction (history plus future) made for
/// the longest configured horizon; it drives the trend classification.
pub fn evaluate(
    model: &dyn FittedModel,
    series: &CleanedSeries,
    longest_forecast: &[Prediction],
) -> Result<ModelDiagnostics, PipelineError> {
    let in_sample = model.predict(&series.dates()).for_product(&series.product_id)?;
    if in_sample.len() != series.len() {
        return Err(PipelineError::forecast(
            &series.product_id,
            format!(
                "model returned {} in-sample estimates for {} points",
                in_sample.len(),
                series.len()
            ),
        ));
    }

    let actual = series.quantities();
    let predicted: Vec<f64> = in_sample.iter().map(|p| p.point).collect();
    let mape = mean_absolute_percentage_error(&actual, &predicted);

    Ok(ModelDiagnostics {
        mae: mean_absolute_error(&actual, &predicted),
        mape,
        trend_status: classify_trend(longest_forecast),
        confidence_score: confidence_score(mape),
    })
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Percentage error against `max(actual, 1)` so zero-sale days stay finite.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs() / a.max(1.0))
        .sum::<f64>()
        / actual.len() as f64
        * 100.0
}

pub fn classify_trend(forecast: &[Prediction]) -> TrendStatus {
    if forecast.is_empty() {
        return TrendStatus::Stable;
    }
    let window = TREND_WINDOW.min(forecast.len());
    let mean_trend =
        |rows: &[Prediction]| rows.iter().map(|p| p.trend).sum::<f64>() / rows.len() as f64;

    let drift = mean_trend(&forecast[forecast.len() - window..]) - mean_trend(&forecast[..window]);
    if drift > TREND_THRESHOLD {
        TrendStatus::Trending
    } else if drift < -TREND_THRESHOLD {
        TrendStatus::Declining
    } else {
        TrendStatus::Stable
    }
}

pub fn confidence_score(mape: f64) -> f64 {
    let raw = 1.0 - mape / 100.0;
    if raw.is_nan() {
        return MIN_CONFIDENCE;
    }
    raw.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}
