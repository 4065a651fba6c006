/*!
 * # Forecasting Capability
 *
 * The statistical model behind the pipeline is injected through the
 * [`Forecaster`] / [`FittedModel`] pair. The pipeline only relies on this
 * contract: fit once on a cleaned daily series, then predict point, interval
 * and trend values for any list of dates (historical or future).
 *
 * [`forecasting::SeasonalTrendForecaster`] is the implementation shipped with
 * the crate.
 */

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CleanedSeries;

/// Seasonal-trend forecaster used by default
pub mod forecasting;

pub use forecasting::SeasonalTrendForecaster;

/// Number of points above which the yearly component is enabled.
pub const YEARLY_SEASONALITY_MIN_POINTS: usize = 365;
pub const CHANGEPOINT_PRIOR_SCALE: f64 = 0.1;
pub const SEASONALITY_PRIOR_SCALE: f64 = 10.0;
pub const INTERVAL_WIDTH: f64 = 0.8;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Insufficient data: need at least 2 points, got {0}")]
    InsufficientData(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model fitting failed: {0}")]
    FitFailed(String),

    #[error("Prediction failed: {0}")]
    PredictFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

/// Model settings for a single fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub daily_seasonality: bool,
    pub weekly_seasonality: bool,
    pub yearly_seasonality: bool,
    pub seasonality_mode: SeasonalityMode,
    /// Trend flexibility.
    pub changepoint_prior_scale: f64,
    /// Seasonality flexibility.
    pub seasonality_prior_scale: f64,
    /// Coverage of the uncertainty interval, in (0, 1).
    pub interval_width: f64,
}

impl ModelConfig {
    /// Fixed configuration for a series; only the yearly switch depends on
    /// the data (more than a year of points).
    pub fn for_series(series: &CleanedSeries) -> Self {
        Self {
            yearly_seasonality: series.len() > YEARLY_SEASONALITY_MIN_POINTS,
            ..Self::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            daily_seasonality: true,
            weekly_seasonality: true,
            yearly_seasonality: false,
            seasonality_mode: SeasonalityMode::Multiplicative,
            changepoint_prior_scale: CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: SEASONALITY_PRIOR_SCALE,
            interval_width: INTERVAL_WIDTH,
        }
    }
}

/// Model output for one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub point: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub trend: f64,
}

pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    fn fit(
        &self,
        series: &CleanedSeries,
        config: &ModelConfig,
    ) -> Result<Box<dyn FittedModel>, ModelError>;
}

pub trait FittedModel: Send + Sync {
    /// One prediction per requested date, in the same order.
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>, ModelError>;
}
