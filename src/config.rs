use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::DEFAULT_HORIZONS;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Forecasting run settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ForecastSettings {
    /// Horizons to forecast, in days
    #[serde(default = "default_horizons")]
    #[validate(custom = "validate_horizons")]
    pub horizons: Vec<u32>,

    /// Products fitted concurrently (1 = sequential)
    #[serde(default = "default_max_workers")]
    #[validate(range(min = 1, max = 256))]
    pub max_workers: usize,

    /// Stop starting new products after this many seconds
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizons: default_horizons(),
            max_workers: default_max_workers(),
            run_deadline_secs: None,
        }
    }
}

impl ForecastSettings {
    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}

/// Retry settings for connecting and fetching
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts including the first (1 = no retry)
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations before forecasting
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub forecast: ForecastSettings,

    #[serde(default)]
    #[validate]
    pub retry: RetrySettings,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            forecast: ForecastSettings::default(),
            retry: RetrySettings::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_horizons() -> Vec<u32> {
    DEFAULT_HORIZONS.to_vec()
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_initial_delay_ms() -> u64 {
    DEFAULT_RETRY_INITIAL_DELAY_MS
}

fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_horizons(horizons: &Vec<u32>) -> Result<(), ValidationError> {
    let mut err = ValidationError::new("horizons");
    if horizons.is_empty() {
        err.message = Some("at least one forecast horizon is required".into());
        return Err(err);
    }
    if horizons.iter().any(|&h| h == 0) {
        err.message = Some("forecast horizons must be positive".into());
        return Err(err);
    }
    let unique: HashSet<u32> = horizons.iter().copied().collect();
    if unique.len() != horizons.len() {
        err.message = Some("forecast horizons must be unique".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("stateset_forecast={},sea_orm=warn,sqlx=warn", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
/// 5. DATABASE_URL, if set
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_with_url(None)
}

/// Like [`load_config`], with an explicit database URL taking precedence
/// over every other source.
pub fn load_config_with_url(database_url: Option<&str>) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env, database_url)
}

/// Loads configuration from an explicit config directory and profile.
pub fn load_config_from(
    config_dir: &Path,
    run_env: &str,
    database_url: Option<&str>,
) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            config_dir = %config_dir.display(),
            "Config directory not found; using built-in defaults and environment variables"
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "")?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("forecast.horizons"),
        );

    if let Ok(url) = env::var("DATABASE_URL") {
        if !url.trim().is_empty() {
            builder = builder.set_override("database_url", url)?;
        }
    }
    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        builder = builder.set_override("database_url", url)?;
    }

    let app_config: AppConfig = builder.build()?.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid_once_url_is_set() {
        let cfg = AppConfig::new("sqlite::memory:");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.forecast.horizons, vec![7, 30, 90, 365]);
        assert_eq!(cfg.forecast.max_workers, 4);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert!(cfg.forecast.run_deadline().is_none());
    }

    #[test]
    fn empty_database_url_is_rejected() {
        let cfg = AppConfig::new("");
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("database_url"));
    }

    #[test]
    fn bad_horizons_are_rejected() {
        for horizons in [vec![], vec![7, 0], vec![7, 7]] {
            let mut cfg = AppConfig::new("sqlite::memory:");
            cfg.forecast.horizons = horizons.clone();
            assert!(cfg.validate().is_err(), "{:?} should be invalid", horizons);
        }
    }

    #[test]
    fn zero_workers_and_attempts_are_rejected() {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.forecast.max_workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = AppConfig::new("sqlite::memory:");
        cfg.log_level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_url_wins_over_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "database_url = \"postgres://localhost/from-file\"\n",
        )
        .unwrap();
        let cfg = load_config_from(dir.path(), "test", Some("sqlite::memory:")).unwrap();
        assert_eq!(cfg.database_url(), "sqlite::memory:");
    }

    #[test]
    fn profile_file_is_layered_over_default() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
                database_url = "postgres://localhost/default"
                log_level = "debug"

                [forecast]
                horizons = [7, 30]
            "#,
        )
        .unwrap();
        fs::write(
            dir.path().join("nightly.toml"),
            r#"
                [forecast]
                horizons = [14, 60]
                max_workers = 2
                run_deadline_secs = 600
            "#,
        )
        .unwrap();

        let cfg = load_config_from(dir.path(), "nightly", Some("sqlite::memory:")).unwrap();
        assert_eq!(cfg.environment, "nightly");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.forecast.horizons, vec![14, 60]);
        assert_eq!(cfg.forecast.max_workers, 2);
        assert_eq!(cfg.forecast.run_deadline(), Some(Duration::from_secs(600)));
    }
}
