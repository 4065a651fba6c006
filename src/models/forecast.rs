use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Horizons forecast when nothing else is configured, in days.
pub const DEFAULT_HORIZONS: [u32; 4] = [7, 30, 90, 365];

/// How long a stored summary stays fresh.
pub const FRESHNESS_TTL_HOURS: i64 = 24;

pub fn freshness_ttl() -> Duration {
    Duration::hours(FRESHNESS_TTL_HOURS)
}

/// Aggregated forecast over one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastHorizonResult {
    pub horizon_days: u32,
    pub point_estimate: i64,
    pub lower_bound: i64,
    /// Not clipped; may go negative on pathological inputs.
    pub upper_bound: i64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TrendStatus {
    Trending,
    Declining,
    Stable,
}

/// Engine output for a product, before it is stamped and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductForecast {
    pub product_id: String,
    pub horizons: BTreeMap<u32, ForecastHorizonResult>,
    pub trend_status: TrendStatus,
    pub confidence_score: f64,
    pub mae: f64,
    pub mape: f64,
}

/// Persisted forecast for a (tenant, product) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub tenant_id: String,
    pub product_id: String,
    pub horizons: BTreeMap<u32, ForecastHorizonResult>,
    pub trend_status: TrendStatus,
    pub confidence_score: f64,
    pub mae: f64,
    pub mape: f64,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ForecastSummary {
    /// Stamps a forecast at `generated_at`; expiry is always one TTL later.
    pub fn stamp(tenant_id: &str, forecast: &ProductForecast, generated_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            product_id: forecast.product_id.clone(),
            horizons: forecast.horizons.clone(),
            trend_status: forecast.trend_status,
            confidence_score: forecast.confidence_score,
            mae: forecast.mae,
            mape: forecast.mape,
            generated_at,
            expires_at: generated_at + freshness_ttl(),
        }
    }

    pub fn point_estimate(&self, horizon_days: u32) -> Option<i64> {
        self.horizons.get(&horizon_days).map(|h| h.point_estimate)
    }

    pub fn is_fresh_at(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn forecast() -> ProductForecast {
        let mut horizons = BTreeMap::new();
        horizons.insert(
            7,
            ForecastHorizonResult {
                horizon_days: 7,
                point_estimate: 70,
                lower_bound: 50,
                upper_bound: 90,
            },
        );
        ProductForecast {
            product_id: "p1".into(),
            horizons,
            trend_status: TrendStatus::Stable,
            confidence_score: 0.8,
            mae: 1.5,
            mape: 20.0,
        }
    }

    #[test]
    fn stamp_sets_expiry_one_day_later() {
        let now = Utc::now();
        let summary = ForecastSummary::stamp("tenant-a", &forecast(), now);
        assert_eq!(summary.expires_at - summary.generated_at, Duration::hours(24));
        assert_eq!(summary.point_estimate(7), Some(70));
        assert_eq!(summary.point_estimate(30), None);
        assert!(summary.is_fresh_at(now + Duration::hours(23)));
        assert!(!summary.is_fresh_at(now + Duration::hours(24)));
    }

    #[test]
    fn trend_status_round_trips_through_strings() {
        assert_eq!(TrendStatus::Trending.to_string(), "trending");
        assert_eq!(TrendStatus::Declining.as_ref(), "declining");
        assert_eq!(TrendStatus::from_str("stable").unwrap(), TrendStatus::Stable);
        assert!(TrendStatus::from_str("sideways").is_err());
    }
}
