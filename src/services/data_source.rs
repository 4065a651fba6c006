use async_trait::async_trait;
use chrono::NaiveDate;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationTrait,
};
use tracing::{debug, info, instrument};

use crate::{
    entities::{product, sales_data, SalesData},
    errors::{classify_db_error, PipelineError},
    models::SalesRecord,
};

/// Source of a tenant's historical sales.
#[async_trait]
pub trait SalesDataSource: Send + Sync {
    /// All sales rows for the tenant joined with product names, ordered by
    /// product name then date. An empty vector is a valid answer.
    async fn fetch(&self, tenant_id: &str) -> Result<Vec<SalesRecord>, PipelineError>;
}

#[derive(Debug, FromQueryResult)]
struct SalesRow {
    product_id: String,
    product_name: String,
    date: NaiveDate,
    quantity_sold: Option<f64>,
    unit_price: Option<Decimal>,
}

impl From<SalesRow> for SalesRecord {
    fn from(row: SalesRow) -> Self {
        Self {
            product_id: row.product_id,
            product_name: row.product_name,
            date: row.date,
            quantity_sold: row.quantity_sold,
            unit_price: row.unit_price,
        }
    }
}

/// Reads `sales_data` joined with `products` through the run's connection.
#[derive(Clone)]
pub struct SeaOrmSalesSource {
    db: DatabaseConnection,
}

impl SeaOrmSalesSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SalesDataSource for SeaOrmSalesSource {
    #[instrument(skip(self))]
    async fn fetch(&self, tenant_id: &str) -> Result<Vec<SalesRecord>, PipelineError> {
        debug!("Fetching sales data");
        let started = std::time::Instant::now();

        let rows = SalesData::find()
            .select_only()
            .column(sales_data::Column::ProductId)
            .column_as(product::Column::Name, "product_name")
            .column(sales_data::Column::Date)
            .column(sales_data::Column::QuantitySold)
            .column(sales_data::Column::UnitPrice)
            .join(JoinType::InnerJoin, sales_data::Relation::Product.def())
            .filter(sales_data::Column::UserId.eq(tenant_id))
            .order_by_asc(product::Column::Name)
            .order_by_asc(sales_data::Column::ProductId)
            .order_by_asc(sales_data::Column::Date)
            .order_by_asc(sales_data::Column::Id)
            .into_model::<SalesRow>()
            .all(&self.db)
            .await
            .map_err(|e| {
                counter!("stateset_forecast.fetch.errors", 1);
                classify_db_error(e)
            })?;

        histogram!("stateset_forecast.fetch.duration", started.elapsed());
        info!(rows = rows.len(), "Fetched sales records");

        Ok(rows.into_iter().map(SalesRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::{ProductActiveModel, SalesDataActiveModel};
    use sea_orm::{ActiveModelTrait, Set};

    async fn seeded_db() -> DatabaseConnection {
        let db = establish_connection_with_config(&DbConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();

        for (id, name) in [("p-b", "Bolts"), ("p-a", "Anchors")] {
            ProductActiveModel {
                id: Set(id.to_string()),
                name: Set(name.to_string()),
            }
            .insert(&db)
            .await
            .unwrap();
        }

        let day = |d| NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        let rows = [
            ("tenant-1", "p-b", day(2), Some(4.0)),
            ("tenant-1", "p-a", day(3), None),
            ("tenant-1", "p-b", day(1), Some(2.0)),
            ("tenant-1", "p-a", day(1), Some(9.0)),
            ("tenant-2", "p-a", day(1), Some(100.0)),
        ];
        for (tenant, product_id, date, qty) in rows {
            SalesDataActiveModel {
                user_id: Set(tenant.to_string()),
                product_id: Set(product_id.to_string()),
                date: Set(date),
                quantity_sold: Set(qty),
                unit_price: Set(Some(Decimal::new(1999, 2))),
                ..Default::default()
            }
            .insert(&db)
            .await
            .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn fetch_is_scoped_to_tenant_and_ordered() {
        let source = SeaOrmSalesSource::new(seeded_db().await);
        let records = source.fetch("tenant-1").await.unwrap();

        let keys: Vec<(&str, u32)> = records
            .iter()
            .map(|r| (r.product_name.as_str(), chrono::Datelike::day(&r.date)))
            .collect();
        assert_eq!(
            keys,
            vec![("Anchors", 1), ("Anchors", 3), ("Bolts", 1), ("Bolts", 2)]
        );
        assert_eq!(records[1].quantity_sold, None);
        assert!(records[0].unit_price.is_some());
    }

    #[tokio::test]
    async fn unknown_tenant_yields_no_rows() {
        let source = SeaOrmSalesSource::new(seeded_db().await);
        assert!(source.fetch("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tables_are_a_fetch_error() {
        let db = establish_connection_with_config(&DbConfig::new("sqlite::memory:"))
            .await
            .unwrap();
        let err = SeaOrmSalesSource::new(db).fetch("tenant-1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }
}
