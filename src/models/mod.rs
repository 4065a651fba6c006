//! Domain records passed between pipeline stages.

pub mod forecast;
pub mod sales;

pub use forecast::{
    freshness_ttl, ForecastHorizonResult, ForecastSummary, ProductForecast, TrendStatus,
    DEFAULT_HORIZONS, FRESHNESS_TTL_HOURS,
};
pub use sales::{CleanedSeries, SalesRecord, SeriesPoint};
