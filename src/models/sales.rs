use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One day of sales for a product, as fetched for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub product_id: String,
    pub product_name: String,
    pub date: NaiveDate,
    /// `None` when the datastore holds a null quantity; cleaned to zero.
    pub quantity_sold: Option<f64>,
    pub unit_price: Option<Decimal>,
}

impl SalesRecord {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        date: NaiveDate,
        quantity_sold: Option<f64>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            date,
            quantity_sold,
            unit_price: None,
        }
    }

    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub quantity: f64,
}

/// Canonical daily series for one product.
///
/// Dates are strictly ascending and unique, quantities are non-negative and
/// outliers are already clipped. Only the cleaner builds these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedSeries {
    pub product_id: String,
    pub product_name: String,
    pub points: Vec<SeriesPoint>,
}

impl CleanedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn quantities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.quantity).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}
