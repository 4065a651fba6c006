use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    db::{close_pool, connect_with_retry, DbConfig, DbPool, RetryConfig},
    errors::PipelineError,
};

/// Everything a single forecasting run needs, passed explicitly.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub started_at: DateTime<Utc>,
    db: DbPool,
}

impl RunContext {
    pub fn new(tenant_id: impl Into<String>, db: DbPool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            started_at: Utc::now(),
            db,
        }
    }

    /// The run's single connection.
    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Acquires the run connection, runs `f` inside the run span and closes
    /// the connection afterwards whatever `f` returned. The connect happens
    /// inside the span too.
    pub async fn scope<F, Fut, T>(
        db_config: &DbConfig,
        retry: &RetryConfig,
        tenant_id: &str,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("forecast_run", run_id = %run_id, tenant_id = %tenant_id);

        let db = connect_with_retry(db_config, retry)
            .instrument(span.clone())
            .await
            .map_err(|e| {
                span.in_scope(|| {
                    error!(%tenant_id, error = %e, "Failed to acquire run connection")
                });
                e
            })?;
        let ctx = RunContext {
            run_id,
            ..RunContext::new(tenant_id, db)
        };

        let outcome = f(ctx.clone()).instrument(span.clone()).await;

        span.in_scope(|| info!("Releasing run connection"));
        close_pool(ctx.db).await;
        outcome
    }
}
