/// Forecast request pipeline.
///
/// ```text
/// AreaQuery ─► keys ─► series ─► job (write ─► forecaster ─► read) ─► ForecastResponse
/// ```
///
/// Every stage may fail. The first failure is logged with its cause and
/// returned; nothing downstream runs.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::job::{ForecastJob, Forecaster};
use crate::keys;
use crate::model::{AreaQuery, ForecastResponse, ForecastResultPoint, MigrationScenario};
use crate::series;
use crate::store::ForecastStore;

/// Per-deployment settings the pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory shared with the forecasting process.
    pub work_dir: PathBuf,
    /// Fail the request instead of returning an empty scenario when a
    /// result file is missing or unparsable.
    pub strict_results: bool,
    /// Remove job files once the results have been read.
    pub cleanup_files: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            strict_results: false,
            cleanup_files: true,
        }
    }
}

/// One request's view of the injected dependencies.
pub struct ForecastPipeline<'a, S: ?Sized, F: ?Sized> {
    store: &'a mut S,
    forecaster: &'a F,
    options: &'a PipelineOptions,
}

impl<'a, S, F> ForecastPipeline<'a, S, F>
where
    S: ForecastStore + ?Sized,
    F: Forecaster + ?Sized,
{
    pub fn new(store: &'a mut S, forecaster: &'a F, options: &'a PipelineOptions) -> Self {
        Self {
            store,
            forecaster,
            options,
        }
    }

    /// Runs the pipeline under a freshly generated job id.
    pub fn run(&mut self, query: &AreaQuery) -> Result<ForecastResponse, PipelineError> {
        let job = ForecastJob::new(&self.options.work_dir);
        self.run_with_job(query, &job)
    }

    pub fn run_with_job(
        &mut self,
        query: &AreaQuery,
        job: &ForecastJob,
    ) -> Result<ForecastResponse, PipelineError> {
        let result = self.execute(query, job);

        if self.options.cleanup_files {
            job.cleanup();
        }

        if let Err(e) = &result {
            log::error!("job {}: {:?}: {}", job.id(), e.code(), e);
        }
        result
    }

    fn execute(
        &mut self,
        query: &AreaQuery,
        job: &ForecastJob,
    ) -> Result<ForecastResponse, PipelineError> {
        let pattern = keys::build_match_pattern(query).ok_or(PipelineError::MissingShapeKeys)?;

        log::info!("job {}: getting municipality keys", job.id());
        let municipality_keys = keys::resolve_keys(&mut *self.store, &pattern)?;

        let inputs = series::fetch_inputs(&mut *self.store, &municipality_keys)?;

        log::info!("job {}: writing pulled data to files", job.id());
        job.write_inputs(&inputs)?;

        self.forecaster.run(job.id(), job.work_dir())?;

        let results = job.read_results(self.options.strict_results)?;
        Ok(compose_response(results))
    }
}

/// Places the scenario results in low, medium, high order. Scenarios
/// without results become empty lists.
pub fn compose_response(
    mut results: HashMap<MigrationScenario, Vec<ForecastResultPoint>>,
) -> ForecastResponse {
    let mut take = |scenario: MigrationScenario| results.remove(&scenario).unwrap_or_default();
    ForecastResponse {
        low_migration: take(MigrationScenario::Low),
        medium_migration: take(MigrationScenario::Medium),
        high_migration: take(MigrationScenario::High),
    }
}
