//! Persistence of SampleSets and analysis summaries.
//!
//! A [`SampleStore`] is rooted at `<data_dir>/<experiment_name>`. Sample sets
//! are written once, at the end of their runner, as CSV with the columns
//! `start_time,end_time,data_size,mode`; summaries land in
//! `results/<analysis_kind>_summary.json`.
//!
//! Concurrent workers share the session directory but never a file: every
//! coordinate has its own artifact name.

use crate::error::{BenchError, Result};
use crate::experiment::ExperimentKind;
use crate::identity::SampleSetId;
use crate::sample::{OperationKind, Sample, SampleSet};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RESULTS_DIR: &str = "results";

/// One CSV row.
#[derive(Debug, Serialize, Deserialize)]
struct SampleRow {
    start_time: f64,
    end_time: f64,
    data_size: usize,
    mode: OperationKind,
}

impl From<&Sample> for SampleRow {
    fn from(sample: &Sample) -> Self {
        Self {
            start_time: sample.start_time(),
            end_time: sample.end_time(),
            data_size: sample.payload_size(),
            mode: sample.operation(),
        }
    }
}

/// Artifact directory of one experiment session.
#[derive(Debug, Clone)]
pub struct SampleStore {
    experiment_name: String,
    session_dir: PathBuf,
}

impl SampleStore {
    pub fn new(data_dir: impl AsRef<Path>, experiment_name: impl Into<String>) -> Self {
        let experiment_name = experiment_name.into();
        let session_dir = data_dir.as_ref().join(&experiment_name);
        Self {
            experiment_name,
            session_dir,
        }
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn results_dir(&self) -> PathBuf {
        self.session_dir.join(RESULTS_DIR)
    }

    pub fn path_of(&self, id: &SampleSetId) -> PathBuf {
        self.session_dir.join(id.file_name())
    }

    /// Write a finished SampleSet to its artifact.
    ///
    /// An empty set is not written and `None` is returned; the aggregator
    /// later reports the gap as an incomplete run.
    pub fn persist(&self, set: &SampleSet) -> Result<Option<PathBuf>> {
        if set.is_empty() {
            warn!("Not persisting empty sample set for {}", set.id());
            return Ok(None);
        }

        fs::create_dir_all(&self.session_dir)
            .map_err(|e| BenchError::io(&self.session_dir, e))?;

        let path = self.path_of(set.id());
        let csv_err = |source| BenchError::Csv {
            path: path.clone(),
            source,
        };

        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        for sample in set.samples() {
            writer.serialize(SampleRow::from(sample)).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| BenchError::io(&path, e))?;

        debug!("Persisted {} samples to {}", set.len(), path.display());
        Ok(Some(path))
    }

    /// Read an artifact back, validating every row.
    pub fn load(&self, id: &SampleSetId) -> Result<SampleSet> {
        let path = self.path_of(id);
        let csv_err = |source| BenchError::Csv {
            path: path.clone(),
            source,
        };

        let mut reader = csv::Reader::from_path(&path).map_err(csv_err)?;
        let mut samples = Vec::new();
        for (index, row) in reader.deserialize::<SampleRow>().enumerate() {
            let row = row.map_err(csv_err)?;
            let invalid = |reason: String| BenchError::InvalidArtifact {
                path: path.clone(),
                row: index + 1,
                reason,
            };
            if row.mode != id.operation {
                return Err(invalid(format!(
                    "{} row in a {} artifact",
                    row.mode, id.operation
                )));
            }
            let sample = Sample::record(row.mode, row.start_time, row.end_time, row.data_size)
                .map_err(|e| invalid(e.to_string()))?;
            samples.push(sample);
        }

        Ok(SampleSet::from_samples(id.clone(), samples))
    }

    /// All sample artifacts in the session, parsed and sorted by coordinate.
    ///
    /// A missing session directory yields an empty list.
    pub fn discover(&self) -> Result<Vec<SampleSetId>> {
        let entries = match fs::read_dir(&self.session_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BenchError::io(&self.session_dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BenchError::io(&self.session_dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            match SampleSetId::parse(&self.experiment_name, name) {
                Some(id) => ids.push(id),
                None => debug!("Ignoring {} in {}", name, self.session_dir.display()),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Fail if any artifact of the given family already exists.
    ///
    /// A family is an experiment kind, plus the evolution step for evolution
    /// runs, restricted to the given operations.
    pub fn ensure_vacant(
        &self,
        kind: ExperimentKind,
        evolution_step: Option<usize>,
        operations: &[OperationKind],
    ) -> Result<()> {
        let clash = self.discover()?.into_iter().find(|id| {
            id.identity.layout.kind() == kind
                && id.identity.evolution_step() == evolution_step
                && operations.contains(&id.operation)
        });

        match clash {
            Some(id) => Err(BenchError::config(format!(
                "{} already exists; choose a new session name",
                self.path_of(&id).display()
            ))),
            None => Ok(()),
        }
    }

    /// Write `<analysis_kind>_summary.json` under the results directory.
    pub fn write_summary<T: Serialize>(&self, analysis_kind: &str, summary: &T) -> Result<PathBuf> {
        let dir = self.results_dir();
        fs::create_dir_all(&dir).map_err(|e| BenchError::io(&dir, e))?;

        let path = dir.join(format!("{}_summary.json", analysis_kind));
        let json = serde_json::to_string_pretty(summary).map_err(|source| BenchError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|e| BenchError::io(&path, e))?;

        Ok(path)
    }
}
