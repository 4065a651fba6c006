use sea_orm::error::DbErr;
use serde::Serialize;

use crate::ml::ModelError;

/// Closed error taxonomy for a forecasting run.
///
/// `Forecast` and `Persist` are scoped to a single product and recovered by
/// the pipeline; every other variant is fatal for the run and propagates to
/// the command boundary.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum PipelineError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Cleaning error: {0}")]
    Cleaning(String),

    #[error("Forecast error for product {product_id}: {message}")]
    Forecast { product_id: String, message: String },

    #[error("Persist error for product {product_id}: {message}")]
    Persist { product_id: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl PipelineError {
    pub fn connection(error: impl std::fmt::Display) -> Self {
        Self::Connection(error.to_string())
    }

    pub fn fetch(error: impl std::fmt::Display) -> Self {
        Self::Fetch(error.to_string())
    }

    pub fn forecast(product_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Forecast {
            product_id: product_id.into(),
            message: error.to_string(),
        }
    }

    pub fn persist(product_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Persist {
            product_id: product_id.into(),
            message: error.to_string(),
        }
    }

    /// Whether the pipeline may skip the affected product and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Forecast { .. } | Self::Persist { .. })
    }

    /// Product the error is scoped to, if any.
    pub fn product_id(&self) -> Option<&str> {
        match self {
            Self::Forecast { product_id, .. } | Self::Persist { product_id, .. } => {
                Some(product_id)
            }
            _ => None,
        }
    }

    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Fetch(_) => "fetch",
            Self::Cleaning(_) => "cleaning",
            Self::Forecast { .. } => "forecast",
            Self::Persist { .. } => "persist",
            Self::Config(_) => "config",
            Self::Migration(_) => "migration",
        }
    }
}

/// Tags a model failure with the product it happened on.
pub trait ForecastResultExt<T> {
    fn for_product(self, product_id: &str) -> Result<T, PipelineError>;
}

impl<T> ForecastResultExt<T> for Result<T, ModelError> {
    fn for_product(self, product_id: &str) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::forecast(product_id, e))
    }
}

impl From<crate::config::AppConfigError> for PipelineError {
    fn from(err: crate::config::AppConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Classifies a raw database error raised while talking to the datastore
/// outside of a product scope.
pub fn classify_db_error(err: DbErr) -> PipelineError {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => PipelineError::connection(err),
        other => PipelineError::fetch(other),
    }
}
