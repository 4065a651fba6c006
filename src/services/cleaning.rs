use std::collections::BTreeMap;

use statrs::statistics::Statistics;
use tracing::{debug, info, instrument, warn};

use crate::{
    errors::PipelineError,
    models::{CleanedSeries, SalesRecord, SeriesPoint},
};

/// Products need at least this many distinct dates to be forecast.
pub const MIN_SERIES_POINTS: usize = 2;
/// Values above `mean + OUTLIER_STDDEVS * stddev` are clipped.
pub const OUTLIER_STDDEVS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedProduct {
    pub product_id: String,
    pub product_name: String,
    pub distinct_dates: usize,
}

/// Result of cleaning a tenant's records.
#[derive(Debug, Clone, Default)]
pub struct CleaningReport {
    /// Forecastable series keyed by product id.
    pub series: BTreeMap<String, CleanedSeries>,
    /// Products dropped for having too few distinct dates.
    pub skipped: Vec<SkippedProduct>,
}

impl CleaningReport {
    /// Every distinct product seen, forecastable or not.
    pub fn total_products(&self) -> usize {
        self.series.len() + self.skipped.len()
    }
}

/// Turns raw sales records into one canonical daily series per product.
#[derive(Debug, Clone, Default)]
pub struct Cleaner;

impl Cleaner {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    pub fn clean(&self, records: &[SalesRecord]) -> Result<CleaningReport, PipelineError> {
        let mut groups: BTreeMap<&str, (&str, Vec<SeriesPoint>)> = BTreeMap::new();

        for record in records {
            if record.product_id.trim().is_empty() {
                return Err(PipelineError::Cleaning(format!(
                    "sales record dated {} has an empty product id",
                    record.date
                )));
            }
            let quantity = record.quantity_sold.unwrap_or(0.0);
            if !quantity.is_finite() {
                return Err(PipelineError::Cleaning(format!(
                    "product {} has a non-finite quantity on {}",
                    record.product_id, record.date
                )));
            }
            if quantity < 0.0 {
                debug!(
                    product_id = %record.product_id,
                    date = %record.date,
                    quantity,
                    "Flooring negative quantity at zero"
                );
            }

            groups
                .entry(record.product_id.as_str())
                .or_insert_with(|| (record.product_name.as_str(), Vec::new()))
                .1
                .push(SeriesPoint {
                    date: record.date,
                    quantity: quantity.max(0.0),
                });
        }

        let mut report = CleaningReport::default();
        for (product_id, (product_name, points)) in groups {
            info!(%product_id, %product_name, "Cleaning sales data for product");

            let mut points = dedup_by_date(points);
            if points.len() < MIN_SERIES_POINTS {
                warn!(
                    %product_id,
                    %product_name,
                    distinct_dates = points.len(),
                    "Insufficient data for product, skipping"
                );
                report.skipped.push(SkippedProduct {
                    product_id: product_id.to_string(),
                    product_name: product_name.to_string(),
                    distinct_dates: points.len(),
                });
                continue;
            }

            let clipped = clip_outliers(&mut points);
            info!(
                %product_id,
                %product_name,
                points = points.len(),
                clipped,
                "Cleaned sales data for product"
            );

            report.series.insert(
                product_id.to_string(),
                CleanedSeries {
                    product_id: product_id.to_string(),
                    product_name: product_name.to_string(),
                    points,
                },
            );
        }

        Ok(report)
    }
}

/// Sorts by date and keeps the first point of each date. The sort is stable,
/// so among equal dates the earliest input record wins.
pub fn dedup_by_date(mut points: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
    points.sort_by_key(|p| p.date);
    points.dedup_by_key(|p| p.date);
    points
}

/// Caps values above `mean + 3 * stddev` (sample stddev). Returns how many
/// values were capped.
pub fn clip_outliers(points: &mut [SeriesPoint]) -> usize {
    let Some(threshold) = outlier_threshold(points.iter().map(|p| p.quantity)) else {
        return 0;
    };

    let mut clipped = 0;
    for point in points.iter_mut().filter(|p| p.quantity > threshold) {
        point.quantity = threshold;
        clipped += 1;
    }
    clipped
}

/// `mean + 3 * stddev`, or `None` when there is no spread to speak of.
pub fn outlier_threshold(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.into_iter().collect();
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().mean();
    let std_dev = values.iter().std_dev();
    (std_dev.is_finite() && std_dev > 0.0).then(|| mean + OUTLIER_STDDEVS * std_dev)
}
