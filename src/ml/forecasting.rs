//! Seasonal-trend forecasting model.
//!
//! A piecewise-linear trend with a single changepoint, multiplied (or offset)
//! by day-of-week and month-of-year seasonal factors, with a normal
//! uncertainty interval derived from the in-sample residuals.

use chrono::{Datelike, NaiveDate};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use super::{FittedModel, Forecaster, ModelConfig, ModelError, Prediction, SeasonalityMode};
use crate::models::CleanedSeries;

/// Share of the history after which the trend may change slope.
const CHANGEPOINT_RANGE: f64 = 0.8;
/// Prior scale at which the recent slope gets half the weight.
const CHANGEPOINT_HALF_WEIGHT: f64 = 0.05;
const LEVEL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SeasonalTrendForecaster {
    name: String,
}

impl SeasonalTrendForecaster {
    pub fn new() -> Self {
        Self {
            name: "seasonal-trend".to_string(),
        }
    }
}

impl Default for SeasonalTrendForecaster {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct Trend {
    intercept: f64,
    slope: f64,
    changepoint: f64,
    post_slope: f64,
}

impl Trend {
    fn at(&self, t: f64) -> f64 {
        if t <= self.changepoint {
            self.intercept + self.slope * t
        } else {
            self.intercept
                + self.slope * self.changepoint
                + self.post_slope * (t - self.changepoint)
        }
    }
}

/// Fitted seasonal-trend model.
#[derive(Debug, Clone)]
pub struct TrainedSeasonalTrend {
    origin: NaiveDate,
    last_t: f64,
    n: usize,
    mode: SeasonalityMode,
    trend: Trend,
    weekly: [f64; 7],
    yearly: Option<[f64; 12]>,
    sigma: f64,
    z: f64,
}

impl Forecaster for SeasonalTrendForecaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(
        &self,
        series: &CleanedSeries,
        config: &ModelConfig,
    ) -> Result<Box<dyn FittedModel>, ModelError> {
        let n = series.len();
        if n < 2 {
            return Err(ModelError::InsufficientData(n));
        }
        if !(config.interval_width > 0.0 && config.interval_width < 1.0) {
            return Err(ModelError::InvalidInput(format!(
                "interval width must be in (0, 1), got {}",
                config.interval_width
            )));
        }
        if series.points.iter().any(|p| !p.quantity.is_finite()) {
            return Err(ModelError::InvalidInput(format!(
                "series for {} contains non-finite values",
                series.product_id
            )));
        }

        let origin = series.points[0].date;
        let ts: Vec<f64> = series
            .points
            .iter()
            .map(|p| (p.date - origin).num_days() as f64)
            .collect();
        let ys = series.quantities();
        let last_t = ts[n - 1];
        if last_t <= 0.0 {
            return Err(ModelError::FitFailed(
                "series dates must be strictly ascending".to_string(),
            ));
        }

        let trend = fit_trend(&ts, &ys, config.changepoint_prior_scale)?;
        let levels: Vec<f64> = ts.iter().map(|&t| trend.at(t)).collect();

        let weekdays: Vec<usize> = series
            .points
            .iter()
            .map(|p| p.date.weekday().num_days_from_monday() as usize)
            .collect();
        let months: Vec<usize> = series.points.iter().map(|p| p.date.month0() as usize).collect();
        let shrink = config.seasonality_prior_scale / (config.seasonality_prior_scale + 1.0);

        // Daily seasonality is constant at daily granularity and needs no factor.
        let weekly = if config.weekly_seasonality {
            let effects = seasonal_effects(config.seasonality_mode, &ys, &levels, |_| 0.0);
            bucket_factors::<7>(&effects, &weekdays, shrink)
        } else {
            [0.0; 7]
        };

        let yearly = if config.yearly_seasonality {
            let effects = seasonal_effects(config.seasonality_mode, &ys, &levels, |i| {
                weekly[weekdays[i]]
            });
            Some(bucket_factors::<12>(&effects, &months, shrink))
        } else {
            None
        };

        let mut model = TrainedSeasonalTrend {
            origin,
            last_t,
            n,
            mode: config.seasonality_mode,
            trend,
            weekly,
            yearly,
            sigma: 0.0,
            z: 0.0,
        };

        let sum_sq: f64 = series
            .points
            .iter()
            .zip(&ts)
            .map(|(p, &t)| {
                let residual = p.quantity - model.point_at(t, p.date);
                residual * residual
            })
            .sum();
        model.sigma = (sum_sq / (n - 1) as f64).sqrt();

        let normal = Normal::new(0.0, 1.0).map_err(|e| ModelError::FitFailed(e.to_string()))?;
        model.z = normal.inverse_cdf(0.5 + config.interval_width / 2.0);

        debug!(
            product_id = %series.product_id,
            points = n,
            slope = model.trend.slope,
            post_slope = model.trend.post_slope,
            sigma = model.sigma,
            "Fitted seasonal-trend model"
        );

        Ok(Box::new(model))
    }
}

impl TrainedSeasonalTrend {
    fn point_at(&self, t: f64, date: NaiveDate) -> f64 {
        let level = self.trend.at(t);
        let weekly = self.weekly[date.weekday().num_days_from_monday() as usize];
        let yearly = self
            .yearly
            .map(|factors| factors[date.month0() as usize])
            .unwrap_or(0.0);
        match self.mode {
            SeasonalityMode::Multiplicative => level * (1.0 + weekly) * (1.0 + yearly),
            SeasonalityMode::Additive => level + weekly + yearly,
        }
    }
}

impl FittedModel for TrainedSeasonalTrend {
    fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>, ModelError> {
        dates
            .iter()
            .map(|&date| {
                let t = (date - self.origin).num_days() as f64;
                let point = self.point_at(t, date);
                if !point.is_finite() {
                    return Err(ModelError::PredictFailed(format!(
                        "non-finite estimate for {}",
                        date
                    )));
                }
                let steps_ahead = (t - self.last_t).max(0.0);
                let half_width =
                    self.z * self.sigma * (1.0 + steps_ahead / self.n as f64).sqrt();
                Ok(Prediction {
                    date,
                    point,
                    lower_bound: point - half_width,
                    upper_bound: point + half_width,
                    trend: self.trend.at(t),
                })
            })
            .collect()
    }
}

fn least_squares(ts: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    let n = ts.len() as f64;
    if ts.len() < 2 {
        return None;
    }
    let mean_t = ts.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (&t, &y) in ts.iter().zip(ys) {
        sxy += (t - mean_t) * (y - mean_y);
        sxx += (t - mean_t) * (t - mean_t);
    }
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((mean_y - slope * mean_t, slope))
}

fn fit_trend(ts: &[f64], ys: &[f64], changepoint_prior_scale: f64) -> Result<Trend, ModelError> {
    let (intercept, slope) = least_squares(ts, ys)
        .ok_or_else(|| ModelError::FitFailed("degenerate time axis".to_string()))?;

    let last_t = ts[ts.len() - 1];
    let changepoint = last_t * CHANGEPOINT_RANGE;
    let start = ts.partition_point(|&t| t < changepoint);
    let recent_slope = least_squares(&ts[start..], &ys[start..])
        .map(|(_, s)| s)
        .unwrap_or(slope);

    let scale = changepoint_prior_scale.max(0.0);
    let weight = scale / (scale + CHANGEPOINT_HALF_WEIGHT);

    Ok(Trend {
        intercept,
        slope,
        changepoint,
        post_slope: slope + weight * (recent_slope - slope),
    })
}

/// Per-point seasonal effect left after removing the trend and any
/// component already fitted (`prior`).
fn seasonal_effects(
    mode: SeasonalityMode,
    ys: &[f64],
    levels: &[f64],
    prior: impl Fn(usize) -> f64,
) -> Vec<Option<f64>> {
    ys.iter()
        .zip(levels)
        .enumerate()
        .map(|(i, (&y, &level))| match mode {
            SeasonalityMode::Multiplicative => {
                let base = level * (1.0 + prior(i));
                (base > LEVEL_EPSILON).then(|| y / base - 1.0)
            }
            SeasonalityMode::Additive => Some(y - level - prior(i)),
        })
        .collect()
}

/// Averages effects per bucket, centres them on zero and shrinks them.
fn bucket_factors<const N: usize>(
    effects: &[Option<f64>],
    buckets: &[usize],
    shrink: f64,
) -> [f64; N] {
    let mut sums = [0.0; N];
    let mut counts = [0usize; N];
    for (effect, &bucket) in effects.iter().zip(buckets) {
        if let Some(value) = effect {
            sums[bucket] += value;
            counts[bucket] += 1;
        }
    }

    let mut factors = [0.0; N];
    let mut seen = 0;
    let mut total = 0.0;
    for i in 0..N {
        if counts[i] > 0 {
            factors[i] = sums[i] / counts[i] as f64;
            total += factors[i];
            seen += 1;
        }
    }
    if seen == 0 {
        return factors;
    }

    let centre = total / seen as f64;
    for i in 0..N {
        if counts[i] > 0 {
            factors[i] = (factors[i] - centre) * shrink;
        }
    }
    factors
}
