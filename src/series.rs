/// Series acquisition and normalization.
///
/// Water usage is fetched first: its earliest year bounds the observed
/// population query, and an empty usage series ends the request before any
/// population query runs.

use chrono::{Datelike, NaiveDate};

use crate::error::PipelineError;
use crate::model::{MigrationScenario, MunicipalityKey, Series, SeriesName, TimeSeriesPoint, YearValue};
use crate::store::ForecastStore;

// ---------------------------------------------------------------------------
// Transformation
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("year {year} cannot be represented as a calendar date")]
    InvalidYear { year: i32 },
}

/// Dates a yearly aggregate on the last day of its year.
pub fn to_point(row: YearValue) -> Result<TimeSeriesPoint, TransformError> {
    let date = NaiveDate::from_ymd_opt(row.year, 12, 31)
        .ok_or(TransformError::InvalidYear { year: row.year })?;
    Ok(TimeSeriesPoint { date, value: row.value })
}

/// Converts rows in query order; the first bad row aborts the rest.
pub fn to_series(rows: &[YearValue]) -> Result<Series, TransformError> {
    rows.iter().copied().map(to_point).collect()
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// The five series a forecast job is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastInputs {
    pub water_usage: Series,
    pub current_population: Series,
    pub low_migration: Series,
    pub medium_migration: Series,
    pub high_migration: Series,
}

impl ForecastInputs {
    pub fn get(&self, name: SeriesName) -> &Series {
        match name {
            SeriesName::WaterUsage => &self.water_usage,
            SeriesName::CurrentPopulation => &self.current_population,
            SeriesName::ProjectedPopulation(MigrationScenario::Low) => &self.low_migration,
            SeriesName::ProjectedPopulation(MigrationScenario::Medium) => &self.medium_migration,
            SeriesName::ProjectedPopulation(MigrationScenario::High) => &self.high_migration,
        }
    }

    /// All series in the order the job files are written.
    pub fn iter(&self) -> impl Iterator<Item = (SeriesName, &Series)> {
        SeriesName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }

    fn projection_mut(&mut self, scenario: MigrationScenario) -> &mut Series {
        match scenario {
            MigrationScenario::Low => &mut self.low_migration,
            MigrationScenario::Medium => &mut self.medium_migration,
            MigrationScenario::High => &mut self.high_migration,
        }
    }
}

/// Issues the usage and population queries for the resolved keys.
///
/// Any failure aborts; partial inputs are never returned.
pub fn fetch_inputs<S: ForecastStore + ?Sized>(
    store: &mut S,
    keys: &[MunicipalityKey],
) -> Result<ForecastInputs, PipelineError> {
    log::info!("pulling water usage data for {} municipalities", keys.len());
    let water_usage = to_series(&store.water_usage(keys)?)?;

    let start_year = match water_usage.first() {
        Some(point) => point.date.year(),
        None => return Err(PipelineError::NoWaterUsageData { key_count: keys.len() }),
    };

    log::info!("pulling current population data from {}", start_year);
    let current_population = to_series(&store.current_population(keys, start_year)?)?;

    let mut inputs = ForecastInputs {
        water_usage,
        current_population,
        ..ForecastInputs::default()
    };

    for scenario in MigrationScenario::ALL {
        log::info!("pulling {} migration population data", scenario);
        let rows = store.future_population(keys, scenario)?;
        *inputs.projection_mut(scenario) = to_series(&rows)?;
    }

    Ok(inputs)
}
