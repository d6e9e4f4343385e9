//! # Run Identity and Artifact Naming
//!
//! Every persisted SampleSet is addressed by a coordinate: the session
//! (experiment name), the run layout (single run, scalability worker, or
//! scalability-evolution worker) and the operation kind. The coordinate maps
//! one-to-one onto the file names other tools already consume:
//!
//! ```text
//! response_times_<op>.csv
//! ScalabilityExperiment_<client>_ResponsivenessJitterThroughputExperiment_<op>.csv
//! ScalabilityEvolutionExperiment_<step>_ScalabilityExperiment_<client>_ResponsivenessJitterThroughputExperiment_<op>.csv
//! ```
//!
//! File names are parsed into [`SampleSetId`] as soon as they are discovered;
//! all grouping happens on the parsed structure.

use crate::experiment::ExperimentKind;
use crate::sample::OperationKind;

const SINGLE_RUN_PREFIX: &str = "response_times_";
const SCALABILITY_TAG: &str = "ScalabilityExperiment";
const EVOLUTION_TAG: &str = "ScalabilityEvolutionExperiment";
const WORKER_TAG: &str = "ResponsivenessJitterThroughputExperiment";
const EXTENSION: &str = ".csv";

/// Position of one worker within the experiment dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunLayout {
    /// A lone client, no concurrency dimension.
    Single,
    /// One of the workers of a scalability fanout.
    Scalability { client_index: usize },
    /// One of the workers of a fanout run as step `step` of an evolution sweep.
    /// The step is the client count of that fanout.
    Evolution { step: usize, client_index: usize },
}

impl RunLayout {
    pub fn kind(&self) -> ExperimentKind {
        match self {
            RunLayout::Single => ExperimentKind::SingleRun,
            RunLayout::Scalability { .. } => ExperimentKind::Scalability,
            RunLayout::Evolution { .. } => ExperimentKind::ScalabilityEvolution,
        }
    }

    /// Layout for worker `client_index` of a fanout, optionally tagged with an evolution step.
    pub fn for_worker(client_index: usize, evolution_step: Option<usize>) -> Self {
        match evolution_step {
            Some(step) => RunLayout::Evolution { step, client_index },
            None => RunLayout::Scalability { client_index },
        }
    }
}

/// Coordinate tuple of a run, minus the operation kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunIdentity {
    pub experiment_name: String,
    pub layout: RunLayout,
}

impl RunIdentity {
    pub fn new(experiment_name: impl Into<String>, layout: RunLayout) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            layout,
        }
    }

    pub fn client_index(&self) -> Option<usize> {
        match self.layout {
            RunLayout::Single => None,
            RunLayout::Scalability { client_index } | RunLayout::Evolution { client_index, .. } => {
                Some(client_index)
            }
        }
    }

    /// Number of concurrent workers, when the artifact name records it.
    ///
    /// Plain scalability names do not carry it; the aggregator infers it from
    /// the group.
    pub fn concurrency_level(&self) -> Option<usize> {
        match self.layout {
            RunLayout::Evolution { step, .. } => Some(step),
            _ => None,
        }
    }

    pub fn evolution_step(&self) -> Option<usize> {
        match self.layout {
            RunLayout::Evolution { step, .. } => Some(step),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session '{}'", self.experiment_name)?;
        if let Some(step) = self.evolution_step() {
            write!(f, ", evolution step {}", step)?;
        }
        if let Some(index) = self.client_index() {
            write!(f, ", client {}", index)?;
        }
        Ok(())
    }
}

/// Full coordinate of one SampleSet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleSetId {
    pub identity: RunIdentity,
    pub operation: OperationKind,
}

impl SampleSetId {
    pub fn new(identity: RunIdentity, operation: OperationKind) -> Self {
        Self {
            identity,
            operation,
        }
    }

    /// Artifact file name inside the session directory.
    pub fn file_name(&self) -> String {
        let op = self.operation.as_str();
        match self.identity.layout {
            RunLayout::Single => format!("{}{}{}", SINGLE_RUN_PREFIX, op, EXTENSION),
            RunLayout::Scalability { client_index } => format!(
                "{}_{}_{}_{}{}",
                SCALABILITY_TAG, client_index, WORKER_TAG, op, EXTENSION
            ),
            RunLayout::Evolution { step, client_index } => format!(
                "{}_{}_{}_{}_{}_{}{}",
                EVOLUTION_TAG, step, SCALABILITY_TAG, client_index, WORKER_TAG, op, EXTENSION
            ),
        }
    }

    /// Parse an artifact file name found in the directory of `experiment_name`.
    ///
    /// Returns `None` for anything that is not a sample artifact.
    pub fn parse(experiment_name: &str, file_name: &str) -> Option<Self> {
        let (layout, operation) = parse_layout(file_name)?;
        Some(Self::new(RunIdentity::new(experiment_name, layout), operation))
    }
}

impl std::fmt::Display for SampleSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {} mode", self.identity, self.operation)
    }
}

fn parse_layout(file_name: &str) -> Option<(RunLayout, OperationKind)> {
    let stem = file_name.strip_suffix(EXTENSION)?;

    if let Some(op) = stem.strip_prefix(SINGLE_RUN_PREFIX) {
        return Some((RunLayout::Single, op.parse().ok()?));
    }

    if let Some(rest) = strip_tag(stem, EVOLUTION_TAG) {
        let (step, rest) = split_index(rest)?;
        let rest = strip_tag(rest, SCALABILITY_TAG)?;
        let (client_index, rest) = split_index(rest)?;
        let operation = parse_worker_suffix(rest)?;
        return Some((RunLayout::Evolution { step, client_index }, operation));
    }

    if let Some(rest) = strip_tag(stem, SCALABILITY_TAG) {
        let (client_index, rest) = split_index(rest)?;
        let operation = parse_worker_suffix(rest)?;
        return Some((RunLayout::Scalability { client_index }, operation));
    }

    None
}

/// Strips `<tag>_` from the front.
fn strip_tag<'a>(s: &'a str, tag: &str) -> Option<&'a str> {
    s.strip_prefix(tag)?.strip_prefix('_')
}

/// Splits `<digits>_<rest>` into the number and the rest.
fn split_index(s: &str) -> Option<(usize, &str)> {
    let (digits, rest) = s.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, rest))
}

fn parse_worker_suffix(s: &str) -> Option<OperationKind> {
    strip_tag(s, WORKER_TAG)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(layout: RunLayout, operation: OperationKind) -> SampleSetId {
        SampleSetId::new(RunIdentity::new("session", layout), operation)
    }

    #[test]
    fn test_file_names_match_artifact_layout() {
        assert_eq!(
            id(RunLayout::Single, OperationKind::Read).file_name(),
            "response_times_read.csv"
        );
        assert_eq!(
            id(RunLayout::Scalability { client_index: 7 }, OperationKind::Write).file_name(),
            "ScalabilityExperiment_7_ResponsivenessJitterThroughputExperiment_write.csv"
        );
        assert_eq!(
            id(
                RunLayout::Evolution {
                    step: 10,
                    client_index: 3
                },
                OperationKind::Read
            )
            .file_name(),
            "ScalabilityEvolutionExperiment_10_ScalabilityExperiment_3_ResponsivenessJitterThroughputExperiment_read.csv"
        );
    }

    #[test]
    fn test_parse_recovers_every_layout() {
        let layouts = [
            RunLayout::Single,
            RunLayout::Scalability { client_index: 0 },
            RunLayout::Scalability { client_index: 42 },
            RunLayout::Evolution {
                step: 5,
                client_index: 4,
            },
            RunLayout::Evolution {
                step: 50,
                client_index: 49,
            },
        ];
        for layout in layouts {
            for operation in OperationKind::ALL {
                let original = id(layout, operation);
                let parsed = SampleSetId::parse("session", &original.file_name());
                assert_eq!(parsed.as_ref(), Some(&original), "{}", original.file_name());
            }
        }
    }

    #[test]
    fn test_evolution_names_are_never_read_as_scalability() {
        let name = "ScalabilityEvolutionExperiment_10_ScalabilityExperiment_1_ResponsivenessJitterThroughputExperiment_read.csv";
        let parsed = SampleSetId::parse("session", name).unwrap();
        assert_eq!(parsed.identity.layout.kind(), ExperimentKind::ScalabilityEvolution);
        assert_eq!(parsed.identity.evolution_step(), Some(10));
        assert_eq!(parsed.identity.concurrency_level(), Some(10));
        assert_eq!(parsed.identity.client_index(), Some(1));
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        for name in [
            "response_times_summary.json",
            "response_times_delete.csv",
            "ScalabilityExperiment__ResponsivenessJitterThroughputExperiment_read.csv",
            "ScalabilityExperiment_x1_ResponsivenessJitterThroughputExperiment_read.csv",
            "ScalabilityExperiment_1_Other_read.csv",
            "ScalabilityEvolutionExperiment_5_ResponsivenessJitterThroughputExperiment_read.csv",
            "Evolution_5_ScalabilityExperiment_1_ResponsivenessJitterThroughputExperiment_read.csv",
            "notes.txt",
        ] {
            assert!(SampleSetId::parse("session", name).is_none(), "{}", name);
        }
    }
}
