use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_products_table::Migration),
            Box::new(m20250301_000002_create_sales_data_table::Migration),
            Box::new(m20250301_000003_create_forecast_data_table::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum SalesData {
    Table,
    Id,
    UserId,
    ProductId,
    Date,
    QuantitySold,
    UnitPrice,
}

#[derive(DeriveIden)]
enum ForecastData {
    Table,
    Id,
    UserId,
    ProductId,
    #[sea_orm(iden = "forecast_7d")]
    Forecast7d,
    #[sea_orm(iden = "forecast_30d")]
    Forecast30d,
    #[sea_orm(iden = "forecast_90d")]
    Forecast90d,
    #[sea_orm(iden = "forecast_365d")]
    Forecast365d,
    TrendStatus,
    ConfidenceScore,
    Mae,
    Mape,
    HorizonDetail,
    GeneratedAt,
    ExpiresAt,
}

mod m20250301_000001_create_products_table {
    use super::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).string().not_null().primary_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }
}

mod m20250301_000002_create_sales_data_table {
    use super::{Products, SalesData};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_sales_data_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesData::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SalesData::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SalesData::UserId).string().not_null())
                        .col(ColumnDef::new(SalesData::ProductId).string().not_null())
                        .col(ColumnDef::new(SalesData::Date).date().not_null())
                        .col(ColumnDef::new(SalesData::QuantitySold).double().null())
                        .col(ColumnDef::new(SalesData::UnitPrice).decimal_len(16, 4).null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sales_data_product")
                                .from(SalesData::Table, SalesData::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Raw feeds may repeat a date, so this one is not unique.
            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_data_user_product_date")
                        .table(SalesData::Table)
                        .col(SalesData::UserId)
                        .col(SalesData::ProductId)
                        .col(SalesData::Date)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SalesData::Table).to_owned())
                .await
        }
    }
}

mod m20250301_000003_create_forecast_data_table {
    use super::ForecastData;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_forecast_data_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ForecastData::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ForecastData::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ForecastData::UserId).string().not_null())
                        .col(ColumnDef::new(ForecastData::ProductId).string().not_null())
                        .col(ColumnDef::new(ForecastData::Forecast7d).big_integer().null())
                        .col(ColumnDef::new(ForecastData::Forecast30d).big_integer().null())
                        .col(ColumnDef::new(ForecastData::Forecast90d).big_integer().null())
                        .col(ColumnDef::new(ForecastData::Forecast365d).big_integer().null())
                        .col(ColumnDef::new(ForecastData::TrendStatus).string().not_null())
                        .col(ColumnDef::new(ForecastData::ConfidenceScore).double().not_null())
                        .col(ColumnDef::new(ForecastData::Mae).double().not_null())
                        .col(ColumnDef::new(ForecastData::Mape).double().not_null())
                        .col(ColumnDef::new(ForecastData::HorizonDetail).text().not_null())
                        .col(
                            ColumnDef::new(ForecastData::GeneratedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ForecastData::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_forecast_data_user_product")
                        .table(ForecastData::Table)
                        .col(ForecastData::UserId)
                        .col(ForecastData::ProductId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ForecastData::Table).to_owned())
                .await
        }
    }
}
