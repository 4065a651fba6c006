use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use metrics::histogram;
use tracing::{debug, info, instrument};

use crate::{
    errors::{ForecastResultExt, PipelineError},
    ml::{Forecaster, ModelConfig, Prediction},
    models::{CleanedSeries, ForecastHorizonResult, ProductForecast, DEFAULT_HORIZONS},
    services::diagnostics,
};

/// Fits one model per product and aggregates it over every horizon.
pub struct ForecastEngine {
    forecaster: Arc<dyn Forecaster>,
    horizons: Vec<u32>,
}

impl ForecastEngine {
    /// Horizons are sorted and deduplicated; an empty list falls back to the
    /// default set.
    pub fn new(forecaster: Arc<dyn Forecaster>, horizons: impl IntoIterator<Item = u32>) -> Self {
        let mut horizons: Vec<u32> = horizons.into_iter().filter(|&h| h > 0).collect();
        horizons.sort_unstable();
        horizons.dedup();
        if horizons.is_empty() {
            horizons = DEFAULT_HORIZONS.to_vec();
        }
        Self {
            forecaster,
            horizons,
        }
    }

    pub fn with_default_horizons(forecaster: Arc<dyn Forecaster>) -> Self {
        Self::new(forecaster, DEFAULT_HORIZONS)
    }

    pub fn horizons(&self) -> &[u32] {
        &self.horizons
    }

    pub fn forecaster_name(&self) -> &str {
        self.forecaster.name()
    }

    /// Forecasts a product and scores the fit.
    ///
    /// The model is fit once and reused for every horizon and for the
    /// in-sample diagnostics.
    #[instrument(
        skip(self, series),
        fields(product_id = %series.product_id, points = series.len())
    )]
    pub fn forecast(&self, series: &CleanedSeries) -> Result<ProductForecast, PipelineError> {
        let product_id = series.product_id.as_str();
        let config = ModelConfig::for_series(series);

        let started = std::time::Instant::now();
        info!(forecaster = self.forecaster.name(), "Training forecasting model");
        let model = self.forecaster.fit(series, &config).for_product(product_id)?;
        histogram!("stateset_forecast.model.fit_duration", started.elapsed());

        let mut horizons = BTreeMap::new();
        let mut longest_forecast: Vec<Prediction> = Vec::new();
        for &horizon in &self.horizons {
            let dates = extended_dates(series, horizon)
                .ok_or_else(|| PipelineError::forecast(product_id, "series has no dates"))?;
            let predictions = model.predict(&dates).for_product(product_id)?;
            if predictions.len() != dates.len() {
                return Err(PipelineError::forecast(
                    product_id,
                    format!(
                        "model returned {} estimates for {} dates",
                        predictions.len(),
                        dates.len()
                    ),
                ));
            }

            let result = aggregate_future(&predictions, horizon);
            debug!(
                horizon_days = horizon,
                point_estimate = result.point_estimate,
                lower_bound = result.lower_bound,
                upper_bound = result.upper_bound,
                "Horizon forecast"
            );
            horizons.insert(horizon, result);
            longest_forecast = predictions;
        }

        let diagnostics = diagnostics::evaluate(model.as_ref(), series, &longest_forecast)?;
        info!(
            mae = diagnostics.mae,
            mape = diagnostics.mape,
            trend_status = %diagnostics.trend_status,
            "Model trained successfully"
        );

        Ok(ProductForecast {
            product_id: series.product_id.clone(),
            horizons,
            trend_status: diagnostics.trend_status,
            confidence_score: diagnostics.confidence_score,
            mae: diagnostics.mae,
            mape: diagnostics.mape,
        })
    }
}

/// History dates followed by `horizon` consecutive days after the last one.
pub fn extended_dates(series: &CleanedSeries, horizon: u32) -> Option<Vec<NaiveDate>> {
    let last = series.last_date()?;
    let mut dates = series.dates();
    dates.reserve(horizon as usize);
    dates.extend((1..=i64::from(horizon)).map(|offset| last + Duration::days(offset)));
    Some(dates)
}

/// Sums the last `horizon` predictions. Point and lower bound are floored at
/// zero; the upper bound is left as is. Halves round to even.
pub fn aggregate_future(predictions: &[Prediction], horizon: u32) -> ForecastHorizonResult {
    let start = predictions.len().saturating_sub(horizon as usize);
    let future = &predictions[start..];

    let point: f64 = future.iter().map(|p| p.point).sum();
    let lower: f64 = future.iter().map(|p| p.lower_bound).sum();
    let upper: f64 = future.iter().map(|p| p.upper_bound).sum();

    ForecastHorizonResult {
        horizon_days: horizon,
        point_estimate: round_half_even(point.max(0.0)) as i64,
        lower_bound: round_half_even(lower).max(0.0) as i64,
        upper_bound: round_half_even(upper) as i64,
    }
}

fn round_half_even(value: f64) -> f64 {
    if (value - value.trunc()).abs() == 0.5 {
        2.0 * (value / 2.0).round()
    } else {
        value.round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{FittedModel, ModelError};
    use crate::models::{SeriesPoint, TrendStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn series(len: usize) -> CleanedSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        CleanedSeries {
            product_id: "sku-1".into(),
            product_name: "Widget".into(),
            points: (0..len)
                .map(|i| SeriesPoint {
                    date: start + Duration::days(i as i64),
                    quantity: 10.0,
                })
                .collect(),
        }
    }

    /// Predicts `history` for training dates and `future` afterwards.
    struct SplitModel {
        last_history: NaiveDate,
        history: f64,
        future: (f64, f64, f64),
        requests: Arc<Mutex<Vec<usize>>>,
    }

    impl FittedModel for SplitModel {
        fn predict(&self, dates: &[NaiveDate]) -> Result<Vec<Prediction>, ModelError> {
            self.requests.lock().unwrap().push(dates.len());
            Ok(dates
                .iter()
                .enumerate()
                .map(|(i, &date)| {
                    let (point, lower, upper) = if date <= self.last_history {
                        (self.history, self.history, self.history)
                    } else {
                        self.future
                    };
                    Prediction {
                        date,
                        point,
                        lower_bound: lower,
                        upper_bound: upper,
                        trend: i as f64,
                    }
                })
                .collect())
        }
    }

    struct StubForecaster {
        fits: AtomicUsize,
        future: (f64, f64, f64),
        requests: Arc<Mutex<Vec<usize>>>,
    }

    impl StubForecaster {
        fn new(future: (f64, f64, f64)) -> Self {
            Self {
                fits: AtomicUsize::new(0),
                future,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Forecaster for StubForecaster {
        fn name(&self) -> &str {
            "stub"
        }

        fn fit(
            &self,
            series: &CleanedSeries,
            _config: &ModelConfig,
        ) -> Result<Box<dyn FittedModel>, ModelError> {
            self.fits.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SplitModel {
                last_history: series.last_date().unwrap(),
                history: 1_000.0,
                future: self.future,
                requests: self.requests.clone(),
            }))
        }
    }

    struct FailingForecaster;

    impl Forecaster for FailingForecaster {
        fn name(&self) -> &str {
            "failing"
        }

        fn fit(
            &self,
            _series: &CleanedSeries,
            _config: &ModelConfig,
        ) -> Result<Box<dyn FittedModel>, ModelError> {
            Err(ModelError::FitFailed("singular matrix".into()))
        }
    }

    #[test]
    fn fits_once_and_predicts_each_horizon_over_extended_range() {
        let stub = Arc::new(StubForecaster::new((2.0, 1.0, 3.0)));
        let engine = ForecastEngine::with_default_horizons(stub.clone());
        let s = series(20);

        let forecast = engine.forecast(&s).unwrap();

        assert_eq!(stub.fits.load(Ordering::SeqCst), 1);
        // One request per horizon, then one in-sample pass.
        let requests = stub.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![27, 50, 110, 385, 20]);
        assert_eq!(forecast.horizons.len(), 4);
    }

    #[test]
    fn sums_cover_future_days_only() {
        let engine = ForecastEngine::with_default_horizons(Arc::new(StubForecaster::new((
            2.0, 1.0, 3.0,
        ))));
        let forecast = engine.forecast(&series(20)).unwrap();

        let week = forecast.horizons[&7];
        assert_eq!(week.point_estimate, 14);
        assert_eq!(week.lower_bound, 7);
        assert_eq!(week.upper_bound, 21);

        let year = forecast.horizons[&365];
        assert_eq!(year.point_estimate, 730);
        assert_eq!(year.lower_bound, 365);
        assert_eq!(year.upper_bound, 1_095);
    }

    #[test]
    fn negative_sums_clip_point_and_lower_only() {
        let engine = ForecastEngine::new(
            Arc::new(StubForecaster::new((-1.0, -2.0, -0.5))),
            [7],
        );
        let forecast = engine.forecast(&series(5)).unwrap();
        let week = forecast.horizons[&7];
        assert_eq!(week.point_estimate, 0);
        assert_eq!(week.lower_bound, 0);
        assert_eq!(week.upper_bound, -4);
    }

    #[test]
    fn sums_are_rounded_to_nearest_integer() {
        let engine = ForecastEngine::new(Arc::new(StubForecaster::new((0.3, 0.2, 0.45))), [7]);
        let week = engine.forecast(&series(5)).unwrap().horizons[&7];
        assert_eq!(week.point_estimate, 2); // 2.1
        assert_eq!(week.lower_bound, 1); // 1.4
        assert_eq!(week.upper_bound, 3); // 3.15
    }

    #[test]
    fn halfway_sums_round_to_even() {
        let engine = ForecastEngine::new(Arc::new(StubForecaster::new((0.5, 0.5, 0.7))), [5]);
        let result = engine.forecast(&series(5)).unwrap().horizons[&5];
        assert_eq!(result.point_estimate, 2); // 2.5
        assert_eq!(result.lower_bound, 2); // 2.5
        assert_eq!(result.upper_bound, 4); // 3.5

        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_half_even(-3.5), -4.0);
        assert_eq!(round_half_even(2.4), 2.0);
        assert_eq!(round_half_even(2.6), 3.0);
    }

    #[test]
    fn trend_comes_from_longest_horizon() {
        // SplitModel's trend rises with row index, so the longest forecast trends up.
        let engine = ForecastEngine::new(Arc::new(StubForecaster::new((1.0, 1.0, 1.0))), [30, 7]);
        let forecast = engine.forecast(&series(10)).unwrap();
        assert_eq!(forecast.trend_status, TrendStatus::Trending);
        assert_eq!(engine.horizons(), &[7, 30]);
    }

    #[test]
    fn diagnostics_are_in_sample() {
        let engine = ForecastEngine::new(Arc::new(StubForecaster::new((1.0, 1.0, 1.0))), [7]);
        let forecast = engine.forecast(&series(10)).unwrap();
        // actual 10, in-sample 1000
        assert!((forecast.mae - 990.0).abs() < 1e-9);
        assert!((forecast.mape - 9_900.0).abs() < 1e-9);
        assert!((forecast.confidence_score - 0.3).abs() < 1e-12);
    }

    #[test]
    fn fit_failures_are_scoped_to_the_product() {
        let engine = ForecastEngine::with_default_horizons(Arc::new(FailingForecaster));
        let err = engine.forecast(&series(10)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.product_id(), Some("sku-1"));
    }

    #[test]
    fn horizons_are_normalised() {
        let engine = ForecastEngine::new(Arc::new(FailingForecaster), [90, 7, 0, 7]);
        assert_eq!(engine.horizons(), &[7, 90]);
        let engine = ForecastEngine::new(Arc::new(FailingForecaster), Vec::<u32>::new());
        assert_eq!(engine.horizons(), &DEFAULT_HORIZONS);
    }

    #[test]
    fn extended_dates_are_consecutive_after_history() {
        let s = series(3);
        let dates = extended_dates(&s, 2).unwrap();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[3], s.last_date().unwrap() + Duration::days(1));
        assert_eq!(dates[4], s.last_date().unwrap() + Duration::days(2));
    }
}
