//! StateSet Forecast Library
//!
//! Per-product sales demand forecasting for a tenant: fetch sales history,
//! clean it into daily series, forecast several horizons, score the fit and
//! store the latest summary per product.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod ml;
pub mod models;
pub mod services;

pub use context::RunContext;
pub use errors::PipelineError;
pub use services::pipeline::{run_for_tenant, ForecastPipeline, PipelineRun, RunStatus};
