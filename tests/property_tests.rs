//! Property-based tests for the forecasting pipeline invariants.
//!
//! Cleaning, scoring and stamping must hold their guarantees for any input,
//! not only the handful of series the unit tests use.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use stateset_forecast::{
    ml::Prediction,
    models::{ForecastSummary, ProductForecast, SalesRecord, TrendStatus},
    services::{
        cleaning::{outlier_threshold, Cleaner},
        diagnostics::{confidence_score, MAX_CONFIDENCE, MIN_CONFIDENCE},
        forecasting::aggregate_future,
    },
};
use std::collections::BTreeMap;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

// (day offset, quantity) pairs; offsets collide on purpose
fn sales_strategy() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((0i64..20, -50.0f64..5_000.0), 1..60)
}

fn records(rows: &[(i64, f64)]) -> Vec<SalesRecord> {
    rows.iter()
        .map(|&(offset, qty)| {
            SalesRecord::new("sku", "Widget", base_date() + Duration::days(offset), Some(qty))
        })
        .collect()
}

/// First-seen, floored quantity per day offset.
fn first_seen(rows: &[(i64, f64)]) -> BTreeMap<i64, f64> {
    let mut first = BTreeMap::new();
    for &(offset, qty) in rows {
        first.entry(offset).or_insert(qty.max(0.0));
    }
    first
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn cleaned_dates_are_unique_and_keep_first_occurrence(rows in sales_strategy()) {
        let report = Cleaner::new().clean(&records(&rows)).unwrap();
        let first = first_seen(&rows);

        if first.len() < 2 {
            prop_assert!(report.series.is_empty());
            prop_assert_eq!(report.skipped.len(), 1);
            return Ok(());
        }

        let series = &report.series["sku"];
        prop_assert_eq!(series.len(), first.len());
        prop_assert!(series.dates().windows(2).all(|w| w[0] < w[1]));

        let threshold = outlier_threshold(first.values().copied());
        for point in &series.points {
            let offset = (point.date - base_date()).num_days();
            let expected = match threshold {
                Some(t) if first[&offset] > t => t,
                _ => first[&offset],
            };
            prop_assert!((point.quantity - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn cleaned_values_are_non_negative_and_within_threshold(rows in sales_strategy()) {
        let report = Cleaner::new().clean(&records(&rows)).unwrap();
        let threshold = outlier_threshold(first_seen(&rows).values().copied());
        for series in report.series.values() {
            for value in series.quantities() {
                prop_assert!(value >= 0.0);
                if let Some(t) = threshold {
                    prop_assert!(value <= t + 1e-9);
                }
            }
        }
    }

    #[test]
    fn confidence_is_always_bounded(mape in 0.0f64..1e6) {
        let score = confidence_score(mape);
        prop_assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&score));
    }

    #[test]
    fn aggregated_point_and_lower_are_never_negative(
        values in prop::collection::vec(
            (-100.0f64..100.0, -100.0f64..100.0, -100.0f64..100.0),
            1..120,
        ),
        horizon in 1u32..100,
    ) {
        let predictions: Vec<Prediction> = values
            .iter()
            .enumerate()
            .map(|(i, &(point, lower, upper))| Prediction {
                date: base_date() + Duration::days(i as i64),
                point,
                lower_bound: lower,
                upper_bound: upper,
                trend: point,
            })
            .collect();
        let result = aggregate_future(&predictions, horizon);
        prop_assert!(result.point_estimate >= 0);
        prop_assert!(result.lower_bound >= 0);
        prop_assert_eq!(result.horizon_days, horizon);
    }

    #[test]
    fn summaries_expire_exactly_one_day_after_generation(secs in 0i64..4_000_000_000) {
        let generated_at = Utc.timestamp_opt(secs, 0).unwrap();
        let forecast = ProductForecast {
            product_id: "sku".into(),
            horizons: BTreeMap::new(),
            trend_status: TrendStatus::Stable,
            confidence_score: 0.5,
            mae: 0.0,
            mape: 0.0,
        };
        let summary = ForecastSummary::stamp("tenant", &forecast, generated_at);
        prop_assert_eq!(summary.expires_at - summary.generated_at, Duration::hours(24));
    }
}
