/// Integration tests for the forecast request pipeline
///
/// These tests drive the full pipeline (key resolution → series fetch →
/// job files → forecaster → response) against an in-memory store and an
/// in-process forecaster that behaves like the external script: it reads
/// the job's input files and writes one result file per scenario.
///
/// The last test talks to a real database and is ignored by default.
///
/// Run with: cargo test --test forecast_pipeline

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use regex::Regex;
use water_forecast_service::error::{ErrorCode, PipelineError};
use water_forecast_service::job::{
    ForecastJob, Forecaster, ForecasterError, JobId, read_series,
};
use water_forecast_service::model::{
    AreaQuery, ForecastResponse, ForecastResultPoint, MatchPattern, MigrationScenario,
    MunicipalityKey, SeriesName, YearValue,
};
use water_forecast_service::pipeline::{ForecastPipeline, PipelineOptions};
use water_forecast_service::store::{ForecastStore, StoreError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// In-memory store holding per-key yearly values; sums across keys like the
/// SQL aggregates do.
#[derive(Default)]
struct MemoryStore {
    keys: Vec<&'static str>,
    water_usage: Vec<(&'static str, i32, f64)>,
    population: Vec<(&'static str, i32, f64)>,
    projections: Vec<(&'static str, MigrationScenario, i32, f64)>,
    fail_population: bool,
    fail_resolve: bool,
    calls: Vec<String>,
}

fn sum_by_year(rows: impl Iterator<Item = (i32, f64)>) -> Vec<YearValue> {
    let mut by_year: std::collections::BTreeMap<i32, f64> = Default::default();
    for (year, value) in rows {
        *by_year.entry(year).or_default() += value;
    }
    by_year.into_iter().map(|(y, v)| YearValue::new(y, v)).collect()
}

fn contains(keys: &[MunicipalityKey], key: &str) -> bool {
    keys.iter().any(|k| k.as_str() == key)
}

impl ForecastStore for MemoryStore {
    fn resolve_keys(&mut self, pattern: &MatchPattern) -> Result<Vec<MunicipalityKey>, StoreError> {
        self.calls.push("resolve".into());
        if self.fail_resolve {
            return Err(StoreError::Conversion {
                query: "get-full-municipality-keys",
                message: "simulated failure".into(),
            });
        }
        let re = Regex::new(pattern.as_str()).expect("pattern must be a valid regex");
        Ok(self
            .keys
            .iter()
            .filter(|k| re.is_match(k))
            .map(|k| MunicipalityKey(k.to_string()))
            .collect())
    }

    fn water_usage(&mut self, keys: &[MunicipalityKey]) -> Result<Vec<YearValue>, StoreError> {
        self.calls.push("water_usage".into());
        Ok(sum_by_year(
            self.water_usage
                .iter()
                .filter(|(k, _, _)| contains(keys, k))
                .map(|(_, y, v)| (*y, *v)),
        ))
    }

    fn current_population(
        &mut self,
        keys: &[MunicipalityKey],
        start_year: i32,
    ) -> Result<Vec<YearValue>, StoreError> {
        self.calls.push(format!("current_population:{}", start_year));
        if self.fail_population {
            return Err(StoreError::Conversion {
                query: "get-current-population",
                message: "simulated failure".into(),
            });
        }
        Ok(sum_by_year(
            self.population
                .iter()
                .filter(|(k, y, _)| contains(keys, k) && *y >= start_year)
                .map(|(_, y, v)| (*y, *v)),
        ))
    }

    fn future_population(
        &mut self,
        keys: &[MunicipalityKey],
        scenario: MigrationScenario,
    ) -> Result<Vec<YearValue>, StoreError> {
        self.calls.push(format!("future_population:{}", scenario));
        Ok(sum_by_year(
            self.projections
                .iter()
                .filter(|(k, s, _, _)| contains(keys, k) && *s == scenario)
                .map(|(_, _, y, v)| (*y, *v)),
        ))
    }
}

fn sample_store() -> MemoryStore {
    let mut store = MemoryStore {
        keys: vec!["060010000000", "060011000000", "091620000000"],
        water_usage: vec![
            ("060010000000", 2019, 600.0),
            ("060011000000", 2019, 400.0),
            ("060010000000", 2020, 650.0),
            ("060011000000", 2020, 400.0),
            ("091620000000", 2020, 9999.0),
        ],
        population: vec![
            ("060010000000", 2015, 1.0),
            ("060010000000", 2019, 100.0),
            ("060010000000", 2020, 110.0),
        ],
        ..MemoryStore::default()
    };
    for (i, scenario) in MigrationScenario::ALL.into_iter().enumerate() {
        store.projections.push(("060010000000", scenario, 2030, 120.0 + i as f64));
        store.projections.push(("060011000000", scenario, 2030, 80.0));
    }
    store
}

/// Behaves like the forecasting script: a result per scenario derived from
/// the last water usage value and the scenario's projected population.
struct FakeScript;

impl Forecaster for FakeScript {
    fn run(&self, job_id: &JobId, work_dir: &Path) -> Result<(), ForecasterError> {
        let job = ForecastJob::with_id(job_id.clone(), work_dir);
        let usage = read_series(&job.input_path(SeriesName::WaterUsage)).unwrap();
        let last_usage = usage.last().unwrap().value;

        for scenario in MigrationScenario::ALL {
            let projection =
                read_series(&job.input_path(SeriesName::ProjectedPopulation(scenario))).unwrap();
            let points: Vec<ForecastResultPoint> = projection
                .iter()
                .map(|p| ForecastResultPoint {
                    date: p.date.to_string(),
                    lower: last_usage,
                    forecast: last_usage + p.value,
                    upper: last_usage + 2.0 * p.value,
                })
                .collect();
            fs::write(job.result_path(scenario), serde_json::to_vec(&points).unwrap()).unwrap();
        }
        Ok(())
    }
}

/// Exits non-zero without producing anything.
struct FailingScript;

impl Forecaster for FailingScript {
    fn run(&self, _: &JobId, _: &Path) -> Result<(), ForecasterError> {
        Err(ForecasterError::ExitStatus { code: Some(1) })
    }
}

/// Only writes the low scenario result.
struct PartialScript;

impl Forecaster for PartialScript {
    fn run(&self, job_id: &JobId, work_dir: &Path) -> Result<(), ForecasterError> {
        let job = ForecastJob::with_id(job_id.clone(), work_dir);
        fs::write(
            job.result_path(MigrationScenario::Low),
            r#"[{"ds":"2030-12-31","lower":1.0,"forecast":2.0,"upper":3.0}]"#,
        )
        .unwrap();
        Ok(())
    }
}

fn options(dir: &Path) -> PipelineOptions {
    PipelineOptions {
        work_dir: dir.to_path_buf(),
        strict_results: false,
        cleanup_files: false,
    }
}

fn run(
    store: &mut MemoryStore,
    forecaster: &dyn Forecaster,
    options: &PipelineOptions,
    query: &[&str],
) -> Result<ForecastResponse, PipelineError> {
    let mut pipeline = ForecastPipeline::new(store, forecaster, options);
    pipeline.run(&AreaQuery::new(query.iter().copied()))
}

// ---------------------------------------------------------------------------
// 1. Successful forecasts
// ---------------------------------------------------------------------------

#[test]
fn test_prefix_query_aggregates_child_municipalities() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();

    let response = run(&mut store, &FakeScript, &options(dir.path()), &["06001"]).unwrap();

    // usage 2020 = 650 + 400 (the 09162 key is not a child of 06001)
    assert_eq!(response.low_migration.len(), 1);
    assert_eq!(response.low_migration[0].date, "2030-12-31");
    assert_eq!(response.low_migration[0].lower, 1050.0);
    assert_eq!(response.low_migration[0].forecast, 1050.0 + 200.0);
    assert_eq!(response.medium_migration[0].forecast, 1050.0 + 201.0);
    assert_eq!(response.high_migration[0].forecast, 1050.0 + 202.0);
}

#[test]
fn test_population_starts_at_first_usage_year() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();
    let opts = options(dir.path());
    let job = ForecastJob::with_id(JobId::generate(), dir.path());

    ForecastPipeline::new(&mut store, &FakeScript, &opts)
        .run_with_job(&AreaQuery::new(["060010000000"]), &job)
        .unwrap();

    assert!(store.calls.contains(&"current_population:2019".to_string()));

    let population = read_series(&job.input_path(SeriesName::CurrentPopulation)).unwrap();
    let years: Vec<String> = population.iter().map(|p| p.date.to_string()).collect();
    assert_eq!(years, vec!["2019-12-31", "2020-12-31"]);

    let usage = read_series(&job.input_path(SeriesName::WaterUsage)).unwrap();
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].value, 600.0);
}

#[test]
fn test_repeated_requests_give_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();
    let opts = options(dir.path());

    let first = run(&mut store, &FakeScript, &opts, &["06001", "091620000000"]).unwrap();
    let second = run(&mut store, &FakeScript, &opts, &["06001", "091620000000"]).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_cleanup_removes_job_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();
    let opts = PipelineOptions {
        cleanup_files: true,
        ..options(dir.path())
    };

    run(&mut store, &FakeScript, &opts, &["06001"]).unwrap();

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_concurrent_jobs_share_work_dir_without_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let opts = Arc::new(options(dir.path()));
    let responses = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let opts = Arc::clone(&opts);
            let responses = Arc::clone(&responses);
            thread::spawn(move || {
                let mut store = sample_store();
                let query = if i % 2 == 0 { "060010000000" } else { "06001" };
                let response = run(&mut store, &FakeScript, &opts, &[query]).unwrap();
                responses.lock().unwrap().push((query, response));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for (query, response) in responses.lock().unwrap().iter() {
        let expected_lower = if *query == "060010000000" { 650.0 } else { 1050.0 };
        assert_eq!(response.low_migration[0].lower, expected_lower, "query {}", query);
    }

    // 8 jobs x (5 inputs + 3 results)
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 64);
}

// ---------------------------------------------------------------------------
// 2. Failures
// ---------------------------------------------------------------------------

#[test]
fn test_empty_query_is_missing_shape_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();

    let err = run(&mut store, &FakeScript, &options(dir.path()), &[]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::MissingShapeKeys);
    assert!(store.calls.is_empty(), "no query may run without keys");
}

#[test]
fn test_no_water_usage_stops_before_population_queries() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();

    let err = run(&mut store, &FakeScript, &options(dir.path()), &["99"]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::NoWaterUsageData);
    assert_eq!(store.calls, vec!["resolve", "water_usage"]);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_key_lookup_failure_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore {
        fail_resolve: true,
        ..sample_store()
    };

    let err = run(&mut store, &FakeScript, &options(dir.path()), &["06001"]).unwrap_err();

    assert!(matches!(err, PipelineError::ResolveKeys(_)));
    assert_eq!(err.code(), ErrorCode::InternalError);
    assert_eq!(store.calls, vec!["resolve"]);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_store_failure_aborts_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore {
        fail_population: true,
        ..sample_store()
    };

    let err = run(&mut store, &FakeScript, &options(dir.path()), &["06001"]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::DatabaseQueryError);
    assert!(!store.calls.iter().any(|c| c.starts_with("future_population")));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_forecaster_failure_is_rscript_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();

    let err = run(&mut store, &FailingScript, &options(dir.path()), &["06001"]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::RScriptError);
}

#[test]
fn test_unwritable_work_dir_is_data_writing_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();
    let opts = options(&dir.path().join("missing"));

    let err = run(&mut store, &FakeScript, &opts, &["06001"]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::DataWriting);
}

#[test]
fn test_missing_result_files_are_tolerated_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();

    let response = run(&mut store, &PartialScript, &options(dir.path()), &["06001"]).unwrap();

    assert_eq!(response.low_migration.len(), 1);
    assert!(response.medium_migration.is_empty());
    assert!(response.high_migration.is_empty());
}

#[test]
fn test_missing_result_files_fail_in_strict_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = sample_store();
    let opts = PipelineOptions {
        strict_results: true,
        ..options(dir.path())
    };

    let err = run(&mut store, &PartialScript, &opts, &["06001"]).unwrap_err();

    assert_eq!(err.code(), ErrorCode::MissingForecastResult);
}

// ---------------------------------------------------------------------------
// 3. Database
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run when database is available
fn test_water_usage_query_against_database() {
    use water_forecast_service::db;
    use water_forecast_service::keys::{build_match_pattern, resolve_keys};
    use water_forecast_service::store::PostgresStore;

    let client = db::connect_from_env().expect("DATABASE_URL must point to a database");
    let mut store = PostgresStore::new(client);

    let pattern = build_match_pattern(&AreaQuery::new(["03"])).unwrap();
    let keys = resolve_keys(&mut store, &pattern).expect("key resolution should succeed");
    let usage = store.water_usage(&keys).expect("water usage query should succeed");

    for pair in usage.windows(2) {
        assert!(pair[0].year < pair[1].year, "usage must be ordered by year");
    }
}
