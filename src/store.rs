/// Store query contract.
///
/// The forecast pipeline only ever asks the relational store four things,
/// each identified by a fixed query name. [`ForecastStore`] is the seam the
/// pipeline depends on; [`PostgresStore`] is the production implementation
/// and tests substitute an in-memory store.

use postgres::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::model::{MatchPattern, MigrationScenario, MunicipalityKey, YearValue};

// ---------------------------------------------------------------------------
// Named queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryName {
    ResolveKeys,
    WaterUsage,
    CurrentPopulation,
    FuturePopulation,
}

impl QueryName {
    pub fn name(&self) -> &'static str {
        match self {
            QueryName::ResolveKeys => "get-full-municipality-keys",
            QueryName::WaterUsage => "get-water-usages",
            QueryName::CurrentPopulation => "get-current-population",
            QueryName::FuturePopulation => "get-future-population",
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            QueryName::ResolveKeys => {
                "SELECT DISTINCT key
                 FROM geodata.municipalities
                 WHERE key ~ $1
                 ORDER BY key"
            }
            // consumer group 2 = households
            QueryName::WaterUsage => {
                "SELECT year::int4, sum(value)::numeric AS usage
                 FROM water_usage.usages
                 WHERE municipal_key = ANY($1)
                   AND consumer_group = 2
                 GROUP BY year
                 ORDER BY year"
            }
            QueryName::CurrentPopulation => {
                "SELECT year::int4, sum(population)::numeric AS pop
                 FROM population.current
                 WHERE municipality_key = ANY($1)
                   AND year >= $2::int4
                 GROUP BY year
                 ORDER BY year"
            }
            QueryName::FuturePopulation => {
                "SELECT year::int4, sum(population)::numeric AS pop
                 FROM population.prognosis
                 WHERE municipal_key = ANY($1)
                   AND migration_level = $2::text::migration_level
                 GROUP BY year
                 ORDER BY year"
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("query {query} failed: {source}")]
    Query {
        query: &'static str,
        #[source]
        source: postgres::Error,
    },

    #[error("could not read row of query {query}: {source}")]
    Scan {
        query: &'static str,
        #[source]
        source: postgres::Error,
    },

    #[error("unusable value in result of query {query}: {message}")]
    Conversion { query: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Parameterized queries the forecast pipeline issues. Rows of the series
/// queries come back ordered ascending by year.
pub trait ForecastStore {
    /// `get-full-municipality-keys`
    fn resolve_keys(&mut self, pattern: &MatchPattern) -> Result<Vec<MunicipalityKey>, StoreError>;

    /// `get-water-usages`: household consumption summed per year.
    fn water_usage(&mut self, keys: &[MunicipalityKey]) -> Result<Vec<YearValue>, StoreError>;

    /// `get-current-population`: observed population from `start_year` on.
    fn current_population(
        &mut self,
        keys: &[MunicipalityKey],
        start_year: i32,
    ) -> Result<Vec<YearValue>, StoreError>;

    /// `get-future-population`: projected population for one scenario.
    fn future_population(
        &mut self,
        keys: &[MunicipalityKey],
        scenario: MigrationScenario,
    ) -> Result<Vec<YearValue>, StoreError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

/// Blocking PostgreSQL store. One per request; never shared between threads.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn year_values(
        &mut self,
        query: QueryName,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Vec<YearValue>, StoreError> {
        let rows = self
            .client
            .query(query.sql(), params)
            .map_err(|source| StoreError::Query { query: query.name(), source })?;

        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let year: i32 = row
                .try_get(0)
                .map_err(|source| StoreError::Scan { query: query.name(), source })?;
            let sum: Option<Decimal> = row
                .try_get(1)
                .map_err(|source| StoreError::Scan { query: query.name(), source })?;

            let value = sum
                .and_then(|d| d.to_f64())
                .ok_or_else(|| StoreError::Conversion {
                    query: query.name(),
                    message: format!("sum for year {} is not a finite number", year),
                })?;

            values.push(YearValue { year, value });
        }

        Ok(values)
    }
}

fn key_strings(keys: &[MunicipalityKey]) -> Vec<String> {
    keys.iter().map(|k| k.0.clone()).collect()
}

impl ForecastStore for PostgresStore {
    fn resolve_keys(&mut self, pattern: &MatchPattern) -> Result<Vec<MunicipalityKey>, StoreError> {
        let query = QueryName::ResolveKeys;
        let rows = self
            .client
            .query(query.sql(), &[&pattern.as_str()])
            .map_err(|source| StoreError::Query { query: query.name(), source })?;

        rows.iter()
            .map(|row| {
                row.try_get::<_, String>(0)
                    .map(MunicipalityKey)
                    .map_err(|source| StoreError::Scan { query: query.name(), source })
            })
            .collect()
    }

    fn water_usage(&mut self, keys: &[MunicipalityKey]) -> Result<Vec<YearValue>, StoreError> {
        let keys = key_strings(keys);
        self.year_values(QueryName::WaterUsage, &[&keys])
    }

    fn current_population(
        &mut self,
        keys: &[MunicipalityKey],
        start_year: i32,
    ) -> Result<Vec<YearValue>, StoreError> {
        let keys = key_strings(keys);
        self.year_values(QueryName::CurrentPopulation, &[&keys, &start_year])
    }

    fn future_population(
        &mut self,
        keys: &[MunicipalityKey],
        scenario: MigrationScenario,
    ) -> Result<Vec<YearValue>, StoreError> {
        let keys = key_strings(keys);
        self.year_values(QueryName::FuturePopulation, &[&keys, &scenario.as_str()])
    }
}
