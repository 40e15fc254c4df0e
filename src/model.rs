/// Shared data types for the forecast pipeline.
///
/// Everything that crosses a stage boundary lives here: the caller's area
/// query, resolved municipality keys, yearly series handed to the
/// forecasting process and the per-scenario results it returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a fully qualified municipality key.
pub const FULL_KEY_LENGTH: usize = 12;

// ---------------------------------------------------------------------------
// Area identifiers
// ---------------------------------------------------------------------------

/// Area identifiers exactly as the caller supplied them (full keys or prefixes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaQuery {
    pub identifiers: Vec<String>,
}

impl AreaQuery {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Regular expression matched against municipality keys in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPattern(pub String);

impl MatchPattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, fully qualified municipality key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MunicipalityKey(pub String);

impl MunicipalityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MunicipalityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

/// Raw `(year, value)` row as returned by the yearly aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearValue {
    pub year: i32,
    pub value: f64,
}

impl YearValue {
    pub fn new(year: i32, value: f64) -> Self {
        Self { year, value }
    }
}

/// One dated observation. Yearly aggregates are dated on December 31st.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Points ordered by strictly increasing date.
pub type Series = Vec<TimeSeriesPoint>;

/// Demographic projection assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationScenario {
    Low,
    Medium,
    High,
}

impl MigrationScenario {
    pub const ALL: [MigrationScenario; 3] = [
        MigrationScenario::Low,
        MigrationScenario::Medium,
        MigrationScenario::High,
    ];

    /// Literal of the `migration_level` database enum, also used in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationScenario::Low => "low",
            MigrationScenario::Medium => "medium",
            MigrationScenario::High => "high",
        }
    }
}

impl fmt::Display for MigrationScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five input series handed to the forecasting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesName {
    CurrentPopulation,
    ProjectedPopulation(MigrationScenario),
    WaterUsage,
}

impl SeriesName {
    pub const ALL: [SeriesName; 5] = [
        SeriesName::CurrentPopulation,
        SeriesName::ProjectedPopulation(MigrationScenario::Low),
        SeriesName::ProjectedPopulation(MigrationScenario::Medium),
        SeriesName::ProjectedPopulation(MigrationScenario::High),
        SeriesName::WaterUsage,
    ];

    /// File name stem expected by the forecasting process.
    pub fn file_stem(&self) -> &'static str {
        match self {
            SeriesName::CurrentPopulation => "current_population",
            SeriesName::ProjectedPopulation(MigrationScenario::Low) => "low_population_migration",
            SeriesName::ProjectedPopulation(MigrationScenario::Medium) => {
                "medium_population_migration"
            }
            SeriesName::ProjectedPopulation(MigrationScenario::High) => {
                "high_population_migration"
            }
            SeriesName::WaterUsage => "water_usage",
        }
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

// ---------------------------------------------------------------------------
// Forecast results
// ---------------------------------------------------------------------------

/// One projected time unit with its uncertainty interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResultPoint {
    // prophet-style output names the column `ds`
    #[serde(alias = "ds")]
    pub date: String,
    pub lower: f64,
    pub forecast: f64,
    pub upper: f64,
}

/// Response body of a successful forecast request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(rename = "lowMigrationPrognosis")]
    pub low_migration: Vec<ForecastResultPoint>,
    #[serde(rename = "mediumMigrationPrognosis")]
    pub medium_migration: Vec<ForecastResultPoint>,
    #[serde(rename = "highMigrationPrognosis")]
    pub high_migration: Vec<ForecastResultPoint>,
}
