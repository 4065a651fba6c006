pub mod forecast_data;
pub mod product;
pub mod sales_data;

pub use forecast_data::{
    ActiveModel as ForecastDataActiveModel, Entity as ForecastData, Model as ForecastDataModel,
};
pub use product::{ActiveModel as ProductActiveModel, Entity as Product, Model as ProductModel};
pub use sales_data::{
    ActiveModel as SalesDataActiveModel, Entity as SalesData, Model as SalesDataModel,
};
