use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, error, instrument};

use crate::{
    db::with_transaction,
    entities::{forecast_data, ForecastData, ForecastDataActiveModel, ForecastDataModel},
    errors::{classify_db_error, PipelineError},
    models::{ForecastHorizonResult, ForecastSummary, ProductForecast, TrendStatus},
};

/// Latest-forecast storage keyed by (tenant, product).
#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Replaces whatever is stored for the key with `forecast`, stamped now.
    /// Either the old row is gone and the new one present, or nothing changed.
    async fn upsert(
        &self,
        tenant_id: &str,
        forecast: &ProductForecast,
    ) -> Result<ForecastSummary, PipelineError>;

    async fn latest(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Option<ForecastSummary>, PipelineError>;
}

/// `forecast_data` table store.
#[derive(Clone)]
pub struct SeaOrmForecastStore {
    db: DatabaseConnection,
}

impl SeaOrmForecastStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn horizon_column(summary: &ForecastSummary, days: u32) -> Option<i64> {
    summary.point_estimate(days)
}

fn to_active_model(summary: &ForecastSummary, detail: String) -> ForecastDataActiveModel {
    ForecastDataActiveModel {
        user_id: Set(summary.tenant_id.clone()),
        product_id: Set(summary.product_id.clone()),
        forecast_7d: Set(horizon_column(summary, 7)),
        forecast_30d: Set(horizon_column(summary, 30)),
        forecast_90d: Set(horizon_column(summary, 90)),
        forecast_365d: Set(horizon_column(summary, 365)),
        trend_status: Set(summary.trend_status.to_string()),
        confidence_score: Set(summary.confidence_score),
        mae: Set(summary.mae),
        mape: Set(summary.mape),
        horizon_detail: Set(detail),
        generated_at: Set(summary.generated_at),
        expires_at: Set(summary.expires_at),
        ..Default::default()
    }
}

fn from_model(model: ForecastDataModel) -> Result<ForecastSummary, PipelineError> {
    let horizons: BTreeMap<u32, ForecastHorizonResult> =
        serde_json::from_str(&model.horizon_detail).map_err(|e| {
            PipelineError::fetch(format!(
                "stored horizon detail for product {} is unreadable: {}",
                model.product_id, e
            ))
        })?;
    let trend_status = TrendStatus::from_str(&model.trend_status).map_err(|_| {
        PipelineError::fetch(format!(
            "stored trend status '{}' for product {} is unknown",
            model.trend_status, model.product_id
        ))
    })?;

    Ok(ForecastSummary {
        tenant_id: model.user_id,
        product_id: model.product_id,
        horizons,
        trend_status,
        confidence_score: model.confidence_score,
        mae: model.mae,
        mape: model.mape,
        generated_at: model.generated_at,
        expires_at: model.expires_at,
    })
}

#[async_trait]
impl ForecastStore for SeaOrmForecastStore {
    #[instrument(skip(self, forecast), fields(product_id = %forecast.product_id))]
    async fn upsert(
        &self,
        tenant_id: &str,
        forecast: &ProductForecast,
    ) -> Result<ForecastSummary, PipelineError> {
        let summary = ForecastSummary::stamp(tenant_id, forecast, Utc::now());
        let detail = serde_json::to_string(&summary.horizons)
            .map_err(|e| PipelineError::persist(&forecast.product_id, e))?;
        let row = to_active_model(&summary, detail);
        let tenant = summary.tenant_id.clone();
        let product = summary.product_id.clone();

        with_transaction::<_, _, (), DbErr>(&self.db, |txn| {
            Box::pin(async move {
                let removed = ForecastData::delete_many()
                    .filter(forecast_data::Column::UserId.eq(tenant))
                    .filter(forecast_data::Column::ProductId.eq(product))
                    .exec(txn)
                    .await?;
                debug!(rows_removed = removed.rows_affected, "Replaced previous forecast");
                row.insert(txn).await?;
                Ok::<_, DbErr>(())
            })
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Error saving forecast, transaction rolled back");
            counter!("stateset_forecast.persist.errors", 1);
            PipelineError::persist(&forecast.product_id, e)
        })?;

        counter!("stateset_forecast.persist.rows", 1);
        Ok(summary)
    }

    async fn latest(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<Option<ForecastSummary>, PipelineError> {
        ForecastData::find()
            .filter(forecast_data::Column::UserId.eq(tenant_id))
            .filter(forecast_data::Column::ProductId.eq(product_id))
            .one(&self.db)
            .await
            .map_err(classify_db_error)?
            .map(from_model)
            .transpose()
    }
}
