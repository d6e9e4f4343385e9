//! Error taxonomy shared by the recorder, the runners and the aggregator.
//!
//! Every variant carries enough coordinates (session, evolution step, client
//! index, operation kind, artifact path) to locate the offending artifact.
//! Nothing here is retried automatically: failures are measured, not masked.

use crate::experiment::ExperimentKind;
use crate::sample::OperationKind;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = BenchError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BenchError {
    /// A timing observation whose end precedes its start, or which is not finite.
    #[error("invalid sample: ended at {ended_at} before it started at {started_at}")]
    InvalidSample { started_at: f64, ended_at: f64 },

    /// The target rejected or failed to service a request.
    #[error("{action} failed for {coordinate} (request {request}): {source:#}")]
    ProtocolOperation {
        coordinate: String,
        action: &'static str,
        request: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The number of SampleSets found for a group differs from the expected count.
    #[error(
        "incomplete {kind} run in session '{experiment}' ({operation} mode{}): expected {expected} sample sets, found {found}",
        step_suffix(.evolution_step)
    )]
    IncompleteRun {
        experiment: String,
        kind: ExperimentKind,
        operation: OperationKind,
        evolution_step: Option<usize>,
        expected: usize,
        found: usize,
    },

    /// No artifacts at all for the requested session and analysis.
    #[error("no {kind} results (neither read nor write) in {}", .dir.display())]
    NoResults { kind: ExperimentKind, dir: PathBuf },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("worker {client_index} of session '{experiment}' panicked: {source}")]
    WorkerPanicked {
        experiment: String,
        client_index: usize,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed sample artifact {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// An artifact parsed as CSV but holds rows that are not valid samples of its coordinate.
    #[error("invalid sample artifact {} (row {row}): {reason}", .path.display())]
    InvalidArtifact {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("could not encode summary {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not parse configuration {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn step_suffix(step: &Option<usize>) -> String {
    step.map(|s| format!(", evolution step {}", s))
        .unwrap_or_default()
}

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
