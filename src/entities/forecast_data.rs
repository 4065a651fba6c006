use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Latest forecast per (`user_id`, `product_id`).
///
/// The four standard horizons get their own columns; `horizon_detail` holds
/// the JSON of every configured horizon with its bounds.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forecast_data")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: String,
    pub product_id: String,
    pub forecast_7d: Option<i64>,
    pub forecast_30d: Option<i64>,
    pub forecast_90d: Option<i64>,
    pub forecast_365d: Option<i64>,
    pub trend_status: String,
    pub confidence_score: f64,
    pub mae: f64,
    pub mape: f64,
    #[sea_orm(column_type = "Text")]
    pub horizon_detail: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
