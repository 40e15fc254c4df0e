/// Service configuration loader - parses forecast.toml
///
/// Keeps deployment settings (port, shared working directory, forecasting
/// command, access scope) out of the code. Every field has a default, so an
/// absent file yields a working local setup. The database connection string
/// is not part of this file; see [`crate::db`].

use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::job::ProcessForecaster;
use crate::pipeline::PipelineOptions;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_VAR: &str = "FORECAST_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "forecast.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Prefix of the `error` field in error responses.
    pub service_name: String,
    pub listen_port: u16,
    /// Requests handled concurrently. Each holds one database connection
    /// and at most one forecasting process.
    pub worker_threads: usize,
    /// Directory shared with the forecasting process.
    pub work_dir: PathBuf,
    /// Scope the gateway must have granted (`X-Authenticated-Scope`).
    /// No check when unset.
    pub required_scope: Option<String>,
    pub strict_results: bool,
    pub cleanup_files: bool,
    pub forecaster: ForecasterConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "water-usage-forecasts".to_string(),
            listen_port: 8000,
            worker_threads: 4,
            work_dir: env::temp_dir(),
            required_scope: None,
            strict_results: false,
            cleanup_files: true,
            forecaster: ForecasterConfig::default(),
        }
    }
}

/// Command line of the forecasting process: `<program> <script> <job-id> <work-dir>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    pub program: String,
    pub script: PathBuf,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            program: "Rscript".to_string(),
            script: PathBuf::from("./res/prophet.r"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    pub fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid("worker_threads must be at least 1".into()));
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Invalid("service_name must not be empty".into()));
        }
        if self.forecaster.program.trim().is_empty() {
            return Err(ConfigError::Invalid("forecaster.program must not be empty".into()));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            work_dir: self.work_dir.clone(),
            strict_results: self.strict_results,
            cleanup_files: self.cleanup_files,
        }
    }

    pub fn process_forecaster(&self) -> ProcessForecaster {
        ProcessForecaster::new(self.forecaster.program.clone(), self.forecaster.script.clone())
    }
}

/// Loads the configuration from `$FORECAST_CONFIG` or `forecast.toml`.
///
/// A missing default file falls back to [`ServiceConfig::default`]; a file
/// named explicitly through the environment must exist.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    match env::var(CONFIG_PATH_VAR) {
        Ok(path) => load_config_from(Path::new(&path)),
        Err(_) => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config_from(path)
            } else {
                log::info!("{} not found, using default configuration", DEFAULT_CONFIG_PATH);
                Ok(ServiceConfig::default())
            }
        }
    }
}

pub fn load_config_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ServiceConfig::from_toml(&contents, path)
}
