pub mod retry;
pub mod transaction;

use crate::config::AppConfig;
use crate::errors::PipelineError;
use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use retry::{with_retry, RetryConfig, RetryPolicy, TransientPolicy};
pub use transaction::with_transaction;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
///
/// A forecasting run holds exactly one connection, so the pool is pinned to a
/// single connection unless a caller overrides it.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
    /// Log every statement through sqlx
    pub sqlx_logging: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
            sqlx_logging: false,
        }
    }
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            ..Default::default()
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns `PipelineError::Connection` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, PipelineError> {
    debug!(
        max_connections = config.max_connections,
        connect_timeout = ?config.connect_timeout,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(config.sqlx_logging);

    gauge!("stateset_forecast.db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await.map_err(|e| {
        counter!("stateset_forecast.db.connection_failures", 1);
        PipelineError::connection(e)
    })?;

    info!("Database connection established");
    Ok(db_pool)
}

/// Connects, retrying transient failures with exponential backoff
pub async fn connect_with_retry(
    config: &DbConfig,
    retry: &RetryConfig,
) -> Result<DbPool, PipelineError> {
    with_retry(retry, TransientPolicy, || establish_connection_with_config(config)).await
}

/// Runs the embedded migrations
///
/// # Errors
/// Returns `PipelineError::Migration` if migrations fail to execute
pub async fn run_migrations(pool: &DbPool) -> Result<(), PipelineError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| PipelineError::Migration(e.to_string()));

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!("Database migrations completed successfully in {:?}", elapsed),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), PipelineError> {
    debug!("Checking database connection");
    let start = std::time::Instant::now();

    let result = pool.ping().await.map_err(PipelineError::connection);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => histogram!("stateset_forecast.db.ping_latency", elapsed),
        Err(e) => {
            error!("Database connection check failed after {:?}: {}", elapsed, e);
            counter!("stateset_forecast.db.connection_failures", 1);
        }
    }

    result
}

/// Closes the database connection pool
///
/// Failure to close is logged and swallowed: by the time a run is closing its
/// connection the outcome is already decided.
pub async fn close_pool(pool: DbPool) {
    debug!("Closing database connection");
    if let Err(e) = pool.close().await {
        warn!("Failed to close database connection cleanly: {}", e);
    }
}
