//! water_forecast_service: municipal water demand forecasts under three
//! migration scenarios.
//!
//! # Module structure
//!
//! ```text
//! water_forecast_service
//! ├── model     — shared data types (AreaQuery, Series, MigrationScenario, …)
//! ├── config    — service configuration loader (forecast.toml)
//! ├── db        — PostgreSQL connection helpers
//! ├── store     — named store queries behind the ForecastStore trait
//! ├── keys      — shape key → municipality key resolution
//! ├── series    — water usage / population acquisition and normalization
//! ├── job       — file handoff to the external forecasting process
//! ├── pipeline  — request orchestration and response composition
//! ├── error     — request error table and pipeline failure mapping
//! └── endpoint  — HTTP API (tiny_http + worker pool)
//! ```

pub mod config;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod job;
pub mod keys;
pub mod model;
pub mod pipeline;
pub mod series;
pub mod store;
