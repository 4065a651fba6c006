use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{error, info};

use stateset_forecast::{
    config::{self, AppConfig},
    ml::SeasonalTrendForecaster,
    services::pipeline::{run_for_tenant, PipelineRun},
};

/// Forecasts product demand for one tenant and stores the results.
#[derive(Parser, Debug)]
#[command(name = "stateset-forecast", version, about)]
struct Cli {
    /// Tenant whose products are forecast
    tenant_id: String,

    /// Database connection URL; overrides DATABASE_URL and config files
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Run schema migrations before forecasting
    #[arg(long, action = ArgAction::SetTrue)]
    migrate: bool,

    /// Print the run summary as pretty JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version are not failures
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if cli.tenant_id.trim().is_empty() {
        eprintln!("Usage: stateset-forecast <TENANT_ID>");
        return ExitCode::FAILURE;
    }

    match execute(&cli).await {
        Ok(run) => {
            if cli.json {
                match serde_json::to_string_pretty(&run) {
                    Ok(body) => println!("{}", body),
                    Err(e) => error!("Failed to render run summary: {}", e),
                }
            }
            println!(
                "Forecasting completed successfully for tenant {}",
                cli.tenant_id
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Forecasting failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli) -> Result<PipelineRun> {
    let cfg = load(cli)?;
    config::init_tracing(cfg.log_level(), cfg.log_json);
    info!(
        environment = %cfg.environment,
        horizons = ?cfg.forecast.horizons,
        max_workers = cfg.forecast.max_workers,
        "Configuration loaded"
    );

    let run = run_for_tenant(&cfg, &cli.tenant_id, Arc::new(SeasonalTrendForecaster::new()))
        .await?;
    Ok(run)
}

fn load(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = config::load_config_with_url(cli.database_url.as_deref())
        .context("failed to load configuration")?;
    if cli.migrate {
        cfg.auto_migrate = true;
    }
    Ok(cfg)
}
