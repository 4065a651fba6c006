//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use stateset_forecast::{
    db::{close_pool, establish_connection_with_config, run_migrations, DbConfig},
    entities::{ProductActiveModel, SalesDataActiveModel},
};
use tempfile::TempDir;

/// A file-backed SQLite database that outlives individual connections.
pub struct TestDatabase {
    _dir: TempDir,
    pub url: String,
}

impl TestDatabase {
    pub async fn migrated() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("forecast.db").display());
        let db = Self { _dir: dir, url };
        let conn = db.connect().await;
        run_migrations(&conn).await.expect("migrations");
        close_pool(conn).await;
        db
    }

    pub async fn connect(&self) -> DatabaseConnection {
        establish_connection_with_config(&DbConfig::new(self.url.clone()))
            .await
            .expect("connect")
    }
}

pub async fn memory_db() -> DatabaseConnection {
    let db = establish_connection_with_config(&DbConfig::new("sqlite::memory:"))
        .await
        .expect("connect");
    run_migrations(&db).await.expect("migrations");
    db
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

pub async fn insert_product(db: &DatabaseConnection, id: &str, name: &str) {
    ProductActiveModel {
        id: Set(id.to_string()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await
    .expect("insert product");
}

pub async fn insert_sale(
    db: &DatabaseConnection,
    tenant: &str,
    product_id: &str,
    date: NaiveDate,
    quantity: Option<f64>,
) {
    SalesDataActiveModel {
        user_id: Set(tenant.to_string()),
        product_id: Set(product_id.to_string()),
        date: Set(date),
        quantity_sold: Set(quantity),
        unit_price: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert sale");
}

/// `days` of weekly-patterned sales for a product.
pub async fn seed_history(db: &DatabaseConnection, tenant: &str, product_id: &str, days: i64) {
    for offset in 0..days {
        let quantity = 20.0 + (offset % 7) as f64 * 2.0 + offset as f64 * 0.1;
        insert_sale(db, tenant, product_id, day(offset), Some(quantity)).await;
    }
}
