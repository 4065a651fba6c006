use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{future, stream, StreamExt};
use metrics::{counter, histogram};
use serde::Serialize;
use strum::{AsRefStr, Display};
use tracing::{error, info, info_span, instrument, warn};
use uuid::Uuid;

use crate::{
    config::{AppConfig, ForecastSettings},
    context::RunContext,
    db::{run_migrations, with_retry, DbConfig, RetryConfig, TransientPolicy},
    errors::PipelineError,
    ml::Forecaster,
    models::ProductForecast,
    services::{
        cleaning::Cleaner,
        data_source::{SalesDataSource, SeaOrmSalesSource},
        forecasting::ForecastEngine,
        result_store::{ForecastStore, SeaOrmForecastStore},
    },
};

/// How per-product work is scheduled within a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Products forecast concurrently; 1 runs them one after another.
    pub max_workers: usize,
    /// No new product is started once this much time has passed.
    pub run_deadline: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            run_deadline: None,
        }
    }
}

impl From<&ForecastSettings> for PipelineSettings {
    fn from(settings: &ForecastSettings) -> Self {
        Self {
            max_workers: settings.max_workers.max(1),
            run_deadline: settings.run_deadline(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Completed,
    NoSalesData,
    NoForecastableProducts,
}

/// A product the run gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct ProductFailure {
    pub product_id: String,
    pub kind: &'static str,
    pub message: String,
}

/// Outcome of one tenant run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub status: RunStatus,
    /// Every distinct product fetched, including those without enough data.
    pub total_products: usize,
    pub successful_count: usize,
    pub insufficient_data: usize,
    pub failures: Vec<ProductFailure>,
    pub deadline_skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    fn start(run_id: Uuid, tenant_id: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            tenant_id: tenant_id.to_string(),
            status: RunStatus::Completed,
            total_products: 0,
            successful_count: 0,
            insufficient_data: 0,
            failures: Vec::new(),
            deadline_skipped: 0,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.finished_at = Utc::now();
        self
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            tenant_id = %self.tenant_id,
            status = %self.status,
            total_products = self.total_products,
            successful = self.successful_count,
            insufficient_data = self.insufficient_data,
            failed = self.failed_count(),
            deadline_skipped = self.deadline_skipped,
            "Forecasting completed: {}/{} products processed successfully",
            self.successful_count,
            self.total_products
        );
    }
}

/// Drives fetch, clean, forecast and persist for one tenant.
pub struct ForecastPipeline {
    source: Arc<dyn SalesDataSource>,
    store: Arc<dyn ForecastStore>,
    engine: Arc<ForecastEngine>,
    cleaner: Cleaner,
    settings: PipelineSettings,
    retry: RetryConfig,
}

impl ForecastPipeline {
    pub fn new(
        source: Arc<dyn SalesDataSource>,
        store: Arc<dyn ForecastStore>,
        engine: Arc<ForecastEngine>,
    ) -> Self {
        Self {
            source,
            store,
            engine,
            cleaner: Cleaner::new(),
            settings: PipelineSettings::default(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, tenant_id: &str) -> Result<PipelineRun, PipelineError> {
        self.run_with_id(Uuid::new_v4(), tenant_id).await
    }

    /// Runs the whole pipeline for a tenant.
    ///
    /// Fetch and cleaning failures abort the run. Forecast and persist
    /// failures are logged, recorded in the summary and skipped.
    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        tenant_id: &str,
    ) -> Result<PipelineRun, PipelineError> {
        let clock = Instant::now();
        let mut run = PipelineRun::start(run_id, tenant_id);
        counter!("stateset_forecast.runs.started", 1);
        info!("Starting forecasting run");

        let records = with_retry(&self.retry, TransientPolicy, || self.source.fetch(tenant_id))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch sales data");
                e
            })?;

        if records.is_empty() {
            warn!("No sales data found for tenant");
            return Ok(self.finish(run, RunStatus::NoSalesData, clock));
        }

        let report = self.cleaner.clean(&records).map_err(|e| {
            error!(error = %e, "Failed to clean sales data");
            e
        })?;
        run.total_products = report.total_products();
        run.insufficient_data = report.skipped.len();

        if report.series.is_empty() {
            warn!(
                total_products = run.total_products,
                "No products with enough data to forecast"
            );
            return Ok(self.finish(run, RunStatus::NoForecastableProducts, clock));
        }

        let deadline = self.settings.run_deadline.map(|limit| clock + limit);
        let queued = report.series.len();
        let mut attempted = 0;

        let engine = self.engine.clone();
        let mut forecasts = stream::iter(report.series.into_values())
            .take_while(move |_| future::ready(deadline.map_or(true, |d| Instant::now() < d)))
            .map(move |series| {
                let engine = engine.clone();
                async move {
                    let product_id = series.product_id.clone();
                    let span = info_span!("forecast_product", product_id = %product_id);
                    let joined = tokio::task::spawn_blocking(move || {
                        span.in_scope(|| engine.forecast(&series))
                    })
                    .await;
                    let outcome = joined.unwrap_or_else(|e| {
                        let message = format!("worker aborted: {}", e);
                        Err(PipelineError::forecast(&product_id, message))
                    });
                    (product_id, outcome)
                }
            })
            .buffer_unordered(self.settings.max_workers.max(1));

        while let Some((product_id, outcome)) = forecasts.next().await {
            attempted += 1;
            let persisted = match outcome {
                Ok(forecast) => self.persist(tenant_id, &forecast).await,
                Err(e) => Err(e),
            };
            match persisted {
                Ok(()) => run.successful_count += 1,
                Err(e) => recover(&mut run, &product_id, e)?,
            }
        }

        run.deadline_skipped = queued - attempted;
        if run.deadline_skipped > 0 {
            warn!(
                deadline_skipped = run.deadline_skipped,
                "Run deadline reached before every product was started"
            );
        }

        Ok(self.finish(run, RunStatus::Completed, clock))
    }

    async fn persist(
        &self,
        tenant_id: &str,
        forecast: &ProductForecast,
    ) -> Result<(), PipelineError> {
        let summary = self.store.upsert(tenant_id, forecast).await?;
        info!(
            product_id = %summary.product_id,
            trend_status = %summary.trend_status,
            confidence_score = summary.confidence_score,
            expires_at = %summary.expires_at,
            "Successfully saved forecast"
        );
        counter!("stateset_forecast.products.succeeded", 1);
        Ok(())
    }

    fn finish(&self, run: PipelineRun, status: RunStatus, clock: Instant) -> PipelineRun {
        let run = run.finish(status);
        histogram!("stateset_forecast.runs.duration", clock.elapsed());
        counter!("stateset_forecast.runs.finished", 1, "status" => status.as_ref().to_string());
        run.log_summary();
        run
    }
}

/// Records a product-scoped failure, or hands back anything else.
fn recover(
    run: &mut PipelineRun,
    product_id: &str,
    err: PipelineError,
) -> Result<(), PipelineError> {
    if !err.is_recoverable() {
        error!(%product_id, error = %err, "Fatal error while processing product");
        return Err(err);
    }
    error!(%product_id, kind = err.kind(), error = %err, "Error processing product, skipping");
    counter!("stateset_forecast.products.failed", 1, "kind" => err.kind());
    run.failures.push(ProductFailure {
        product_id: product_id.to_string(),
        kind: err.kind(),
        message: err.to_string(),
    });
    Ok(())
}

/// Runs the pipeline for `tenant_id` against the configured database.
///
/// One connection is opened for the run and closed before returning.
pub async fn run_for_tenant(
    config: &AppConfig,
    tenant_id: &str,
    forecaster: Arc<dyn Forecaster>,
) -> Result<PipelineRun, PipelineError> {
    let db_config = DbConfig::from(config);
    let retry = RetryConfig::from(&config.retry);
    let fetch_retry = retry.clone();
    let settings = PipelineSettings::from(&config.forecast);
    let engine = Arc::new(ForecastEngine::new(
        forecaster,
        config.forecast.horizons.iter().copied(),
    ));
    let auto_migrate = config.auto_migrate;

    RunContext::scope(&db_config, &retry, tenant_id, |ctx| async move {
        if auto_migrate {
            run_migrations(ctx.db()).await?;
        }
        let pipeline = ForecastPipeline::new(
            Arc::new(SeaOrmSalesSource::new(ctx.db().clone())),
            Arc::new(SeaOrmForecastStore::new(ctx.db().clone())),
            engine,
        )
        .with_settings(settings)
        .with_retry(fetch_retry);

        pipeline.run_with_id(ctx.run_id, &ctx.tenant_id).await
    })
    .await
}
