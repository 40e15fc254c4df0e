//! Water Usage Forecast Service
//!
//! Serves municipal water demand forecasts over HTTP. For every request it:
//! 1. Resolves the requested shape keys to municipality keys
//! 2. Pulls water usage and population series from PostgreSQL
//! 3. Hands them to the external forecasting process via the work directory
//! 4. Returns the low/medium/high migration forecasts as JSON
//!
//! The statistical model itself runs outside this service (Rscript by
//! default, see forecast.toml).
//!
//! Usage:
//!   cargo run --release                  # Listen on the configured port
//!   cargo run --release -- --port 8080   # Override the listen port
//!
//! Environment:
//!   DATABASE_URL    - PostgreSQL connection string
//!   FORECAST_CONFIG - Path of the configuration file (default: forecast.toml)
//!   RUST_LOG        - Log filter (e.g. info, water_forecast_service=debug)

use std::env;
use std::fs;
use std::sync::Arc;

use water_forecast_service::config;
use water_forecast_service::db::{self, DbConfigError};
use water_forecast_service::endpoint::{self, EndpointContext};
use water_forecast_service::store::{ForecastStore, PostgresStore};

fn main() {
    pretty_env_logger::init_custom_env("RUST_LOG");

    println!("💧 Water Usage Forecast Service");
    println!("================================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut port_override: Option<u16> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => match args.get(i + 1).and_then(|p| p.parse().ok()) {
                Some(port) => {
                    port_override = Some(port);
                    i += 2;
                }
                None => {
                    eprintln!("Error: --port requires a port number");
                    std::process::exit(1);
                }
            },
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--port PORT]", args[0]);
                std::process::exit(1);
            }
        }
    }

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };

    let database_url = match db::database_url() {
        Ok(url) => url,
        Err(e) => {
            eprintln!("\n❌ {}\n", e);
            std::process::exit(1);
        }
    };

    // Fail fast on an unreachable database instead of on the first request
    log::info!("Checking database connectivity...");
    if let Err(e) = db::connect(&database_url) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }

    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!(
            "\n❌ Cannot create work directory {}: {}\n",
            config.work_dir.display(),
            e
        );
        std::process::exit(1);
    }

    log::info!("Work directory: {}", config.work_dir.display());
    log::info!(
        "Forecaster: {} {}",
        config.forecaster.program,
        config.forecaster.script.display()
    );
    if config.required_scope.is_none() {
        log::warn!("No required_scope configured, scope header is not checked");
    }

    let port = port_override.unwrap_or(config.listen_port);
    let workers = config.worker_threads;

    let ctx = Arc::new(EndpointContext {
        service_name: config.service_name.clone(),
        required_scope: config.required_scope.clone(),
        options: config.pipeline_options(),
        forecaster: Box::new(config.process_forecaster()),
        open_store: Box::new(move || -> Result<Box<dyn ForecastStore>, DbConfigError> {
            let client = db::connect(&database_url)?;
            Ok(Box::new(PostgresStore::new(client)) as Box<dyn ForecastStore>)
        }),
    });

    println!("🚀 Starting HTTP endpoint on port {} ({} workers)", port, workers);
    if let Err(e) = endpoint::start_endpoint_server(port, workers, ctx) {
        eprintln!("\n❌ Endpoint server error: {}", e);
        std::process::exit(1);
    }
}
