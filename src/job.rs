/// Forecast jobs: the file-based handoff to the external forecasting process.
///
/// The working directory is shared by every in-flight request. Each job
/// suffixes its files with a unique job id, which is the only isolation
/// between concurrent requests:
///
/// ```text
/// <work_dir>/
/// ├── current_population_<id>.json            ┐
/// ├── low_population_migration_<id>.json      │
/// ├── medium_population_migration_<id>.json   │ written by the service
/// ├── high_population_migration_<id>.json     │
/// ├── water_usage_<id>.json                   ┘
/// ├── result_low_migration_<id>.json          ┐
/// ├── result_medium_migration_<id>.json       │ written by the forecaster
/// └── result_high_migration_<id>.json         ┘
/// ```

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use uuid::Uuid;

use crate::model::{ForecastResultPoint, MigrationScenario, Series, SeriesName};
use crate::series::ForecastInputs;

// ---------------------------------------------------------------------------
// Job identifier
// ---------------------------------------------------------------------------

/// Unique per-request token used as file name suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Random v4 UUID.
    pub fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("could not serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("forecast result {path} unusable: {reason}")]
    MissingResult { path: PathBuf, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ForecasterError {
    #[error("could not launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("forecasting process exited unsuccessfully (code {code:?})")]
    ExitStatus { code: Option<i32> },
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Working context of one forecast request. Never shared between requests.
#[derive(Debug, Clone)]
pub struct ForecastJob {
    id: JobId,
    work_dir: PathBuf,
}

impl ForecastJob {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self::with_id(JobId::generate(), work_dir)
    }

    pub fn with_id(id: JobId, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            id,
            work_dir: work_dir.into(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `<series-name>_<job-id>.json`
    pub fn input_path(&self, name: SeriesName) -> PathBuf {
        self.work_dir
            .join(format!("{}_{}.json", name.file_stem(), self.id))
    }

    /// `result_<scenario>_migration_<job-id>.json`
    pub fn result_path(&self, scenario: MigrationScenario) -> PathBuf {
        self.work_dir
            .join(format!("result_{}_migration_{}.json", scenario.as_str(), self.id))
    }

    /// Writes all five input files. Files written before a failure are left
    /// in place.
    pub fn write_inputs(&self, inputs: &ForecastInputs) -> Result<(), JobError> {
        for (name, series) in inputs.iter() {
            let path = self.input_path(name);
            write_series(&path, series)?;
            log::debug!("job {}: wrote {} points to {}", self.id, series.len(), path.display());
        }
        Ok(())
    }

    /// Reads the result file of one scenario.
    pub fn read_result(
        &self,
        scenario: MigrationScenario,
    ) -> Result<Vec<ForecastResultPoint>, JobError> {
        let path = self.result_path(scenario);
        let contents = fs::read(&path).map_err(|source| JobError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| JobError::Parse { path, source })
    }

    /// Reads all three result files.
    ///
    /// Unless `strict` is set, a missing or unparsable file is logged and
    /// yields an empty list for that scenario.
    pub fn read_results(
        &self,
        strict: bool,
    ) -> Result<HashMap<MigrationScenario, Vec<ForecastResultPoint>>, JobError> {
        let mut results = HashMap::new();

        for scenario in MigrationScenario::ALL {
            let points = match self.read_result(scenario) {
                Ok(points) => points,
                Err(e) if strict => {
                    return Err(JobError::MissingResult {
                        path: self.result_path(scenario),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    log::warn!("job {}: no {} migration result ({})", self.id, scenario, e);
                    Vec::new()
                }
            };
            results.insert(scenario, points);
        }

        Ok(results)
    }

    /// Removes every file belonging to this job. Missing files are ignored.
    pub fn cleanup(&self) {
        let inputs = SeriesName::ALL.into_iter().map(|n| self.input_path(n));
        let results = MigrationScenario::ALL.into_iter().map(|s| self.result_path(s));

        for path in inputs.chain(results) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::debug!("could not remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Serializes a series as `[{"date": "YYYY-MM-DD", "value": n}, ...]`.
pub fn write_series(path: &Path, series: &Series) -> Result<(), JobError> {
    let contents = serde_json::to_vec(series).map_err(|source| JobError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| JobError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads an input file back into a series.
pub fn read_series(path: &Path) -> Result<Series, JobError> {
    let contents = fs::read(path).map_err(|source| JobError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&contents).map_err(|source| JobError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Forecasting process
// ---------------------------------------------------------------------------

/// Synchronous call into the forecasting process. It reads the job's input
/// files from `work_dir` and must leave the result files there before
/// returning.
pub trait Forecaster {
    fn run(&self, job_id: &JobId, work_dir: &Path) -> Result<(), ForecasterError>;
}

/// Runs `<program> <script> <job-id> <work-dir>` and waits for it to exit.
/// There is no timeout and no retry.
#[derive(Debug, Clone)]
pub struct ProcessForecaster {
    pub program: String,
    pub script: PathBuf,
}

impl ProcessForecaster {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
        }
    }
}

impl Forecaster for ProcessForecaster {
    fn run(&self, job_id: &JobId, work_dir: &Path) -> Result<(), ForecasterError> {
        log::info!("starting prognosis via {} for job {}", self.program, job_id);
        let started = Instant::now();

        let status = Command::new(&self.program)
            .arg(&self.script)
            .arg(job_id.as_str())
            .arg(work_dir)
            .stdout(Stdio::inherit())
            .status()
            .map_err(|source| ForecasterError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ForecasterError::ExitStatus { code: status.code() });
        }

        log::info!(
            "finished prognosis for job {} in {:.1}s",
            job_id,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
