//! # Experiments
//!
//! The three experiment kinds, the registry mapping each kind to its
//! constructor and analysis, and the controller that runs a list of
//! experiments and post-processes sessions.
//!
//! The registry is an explicit table built once at startup; there is no
//! lookup by name transformation.

use crate::aggregate::Aggregator;
use crate::error::{BenchError, Result};
use crate::fanout::ConcurrentFanout;
use crate::identity::{RunIdentity, RunLayout};
use crate::protocol::ClientFactory;
use crate::sample::RunClock;
use crate::scalability::ScalabilityDriver;
use crate::store::SampleStore;
use crate::workload::{WorkloadRunner, WorkloadShape};
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Closed set of experiment kinds
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize, Deserialize,
)]
pub enum ExperimentKind {
    /// One client measuring responsiveness, jitter and throughput
    #[clap(name = "responsiveness_jitter_throughput")]
    SingleRun,

    /// N concurrent clients
    #[clap(name = "scalability")]
    Scalability,

    /// One scalability run per client count of a list
    #[clap(name = "scalability_evolution")]
    ScalabilityEvolution,
}

impl ExperimentKind {
    pub const ALL: [ExperimentKind; 3] = [
        ExperimentKind::SingleRun,
        ExperimentKind::Scalability,
        ExperimentKind::ScalabilityEvolution,
    ];

    /// Prefix of the summary file, `<analysis_kind>_summary.json`.
    pub fn analysis_kind(&self) -> &'static str {
        match self {
            ExperimentKind::SingleRun => "response_times",
            ExperimentKind::Scalability => "scalability",
            ExperimentKind::ScalabilityEvolution => "scalability_Evolution",
        }
    }
}

impl std::fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExperimentKind::SingleRun => write!(f, "responsiveness/jitter/throughput"),
            ExperimentKind::Scalability => write!(f, "scalability"),
            ExperimentKind::ScalabilityEvolution => write!(f, "scalability evolution"),
        }
    }
}

/// Shared by every experiment of one controller run.
#[derive(Clone)]
pub struct ExperimentSetup {
    pub store: SampleStore,
    pub factory: Arc<dyn ClientFactory>,
    pub shape: Arc<WorkloadShape>,
}

impl ExperimentSetup {
    fn fanout(&self) -> ConcurrentFanout {
        ConcurrentFanout::new(
            Arc::clone(&self.factory),
            Arc::clone(&self.shape),
            self.store.clone(),
        )
    }
}

/// Concurrency dimensions of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParameters {
    /// Clients of a scalability run
    pub n_clients: usize,
    /// Sweep of a scalability-evolution run
    pub client_counts: Vec<usize>,
}

/// What the post-process needs to know about a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentOutcome {
    pub kind: ExperimentKind,
    pub workers_failed: usize,
    /// Evolution steps to leave out of the analysis.
    pub failed_steps: BTreeSet<usize>,
    /// False when the data must not be analyzed at all.
    pub analyzable: bool,
}

#[async_trait]
pub trait Experiment: Send + Sync {
    fn kind(&self) -> ExperimentKind;

    async fn run(&self, params: &RunParameters) -> Result<ExperimentOutcome>;
}

struct SingleRunExperiment {
    setup: ExperimentSetup,
}

#[async_trait]
impl Experiment for SingleRunExperiment {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::SingleRun
    }

    async fn run(&self, _params: &RunParameters) -> Result<ExperimentOutcome> {
        self.setup.shape.validate()?;
        self.setup
            .store
            .ensure_vacant(self.kind(), None, &self.setup.shape.operations())?;
        let identity = RunIdentity::new(self.setup.store.experiment_name(), RunLayout::Single);
        let client = self.setup.factory.create(&identity);
        let report = WorkloadRunner::new(
            identity,
            Arc::clone(&self.setup.shape),
            self.setup.store.clone(),
            RunClock::start(),
            client,
        )
        .run()
        .await;

        match report.failure {
            Some(failure) if report.sets.is_empty() => Err(failure),
            failure => Ok(ExperimentOutcome {
                kind: self.kind(),
                workers_failed: usize::from(failure.is_some()),
                failed_steps: BTreeSet::new(),
                analyzable: true,
            }),
        }
    }
}

struct ScalabilityExperiment {
    setup: ExperimentSetup,
}

#[async_trait]
impl Experiment for ScalabilityExperiment {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::Scalability
    }

    async fn run(&self, params: &RunParameters) -> Result<ExperimentOutcome> {
        let report = self.setup.fanout().run(params.n_clients, None).await?;
        Ok(ExperimentOutcome {
            kind: self.kind(),
            workers_failed: report.failed_workers(),
            failed_steps: BTreeSet::new(),
            analyzable: report.all_succeeded(),
        })
    }
}

struct EvolutionExperiment {
    setup: ExperimentSetup,
}

#[async_trait]
impl Experiment for EvolutionExperiment {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::ScalabilityEvolution
    }

    async fn run(&self, params: &RunParameters) -> Result<ExperimentOutcome> {
        let driver = ScalabilityDriver::new(self.setup.fanout());
        let outcome = driver.run(&params.client_counts).await?;

        let workers_failed: usize = outcome
            .steps
            .iter()
            .map(|step| match &step.result {
                Ok(report) => report.failed_workers(),
                Err(_) => step.client_count,
            })
            .sum();
        Ok(ExperimentOutcome {
            kind: self.kind(),
            workers_failed,
            failed_steps: outcome.failed_steps(),
            analyzable: true,
        })
    }
}

fn build_single_run(setup: ExperimentSetup) -> Box<dyn Experiment> {
    Box::new(SingleRunExperiment { setup })
}

fn build_scalability(setup: ExperimentSetup) -> Box<dyn Experiment> {
    Box::new(ScalabilityExperiment { setup })
}

fn build_evolution(setup: ExperimentSetup) -> Box<dyn Experiment> {
    Box::new(EvolutionExperiment { setup })
}

fn analyze_single_run(aggregator: &Aggregator, _skip: &BTreeSet<usize>) -> Result<PathBuf> {
    Ok(aggregator.single_run()?.path)
}

fn analyze_scalability(aggregator: &Aggregator, _skip: &BTreeSet<usize>) -> Result<PathBuf> {
    Ok(aggregator.scalability()?.path)
}

fn analyze_evolution(aggregator: &Aggregator, skip: &BTreeSet<usize>) -> Result<PathBuf> {
    Ok(aggregator.evolution(skip)?.path)
}

/// Constructor and analysis of one experiment kind.
#[derive(Clone, Copy)]
pub struct Registration {
    pub build: fn(ExperimentSetup) -> Box<dyn Experiment>,
    /// Aggregates a session, leaving out the given evolution steps.
    pub analyze: fn(&Aggregator, &BTreeSet<usize>) -> Result<PathBuf>,
}

pub struct ExperimentRegistry {
    entries: BTreeMap<ExperimentKind, Registration>,
}

impl ExperimentRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(
            ExperimentKind::SingleRun,
            Registration {
                build: build_single_run,
                analyze: analyze_single_run,
            },
        );
        registry.register(
            ExperimentKind::Scalability,
            Registration {
                build: build_scalability,
                analyze: analyze_scalability,
            },
        );
        registry.register(
            ExperimentKind::ScalabilityEvolution,
            Registration {
                build: build_evolution,
                analyze: analyze_evolution,
            },
        );
        registry
    }

    pub fn register(&mut self, kind: ExperimentKind, registration: Registration) {
        self.entries.insert(kind, registration);
    }

    pub fn get(&self, kind: ExperimentKind) -> Result<&Registration> {
        self.entries
            .get(&kind)
            .ok_or_else(|| BenchError::config(format!("no experiment registered for {}", kind)))
    }
}

/// Result of one requested experiment.
#[derive(Debug)]
pub struct ExperimentReport {
    pub kind: ExperimentKind,
    pub outcome: Result<ExperimentOutcome>,
    /// Present when a post-process was requested and attempted.
    pub analysis: Option<Result<PathBuf>>,
}

/// Runs experiments one after the other and post-processes sessions.
///
/// A failing experiment or session is logged and the controller moves on.
pub struct ExperimentController {
    registry: ExperimentRegistry,
    data_dir: PathBuf,
}

impl ExperimentController {
    pub fn new(registry: ExperimentRegistry, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store(&self, session: &str) -> SampleStore {
        SampleStore::new(&self.data_dir, session)
    }

    pub async fn run_experiments(
        &self,
        kinds: &[ExperimentKind],
        session: &str,
        factory: Arc<dyn ClientFactory>,
        shape: Arc<WorkloadShape>,
        params: &RunParameters,
        post_process: bool,
    ) -> Vec<ExperimentReport> {
        let setup = ExperimentSetup {
            store: self.store(session),
            factory,
            shape,
        };

        let mut reports = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            info!("Running {} experiment in session '{}'", kind, session);
            let outcome = match self.registry.get(kind) {
                Ok(registration) => (registration.build)(setup.clone()).run(params).await,
                Err(e) => Err(e),
            };

            let analysis = match &outcome {
                Ok(outcome) => {
                    if outcome.workers_failed > 0 {
                        warn!(
                            "{} experiment finished with {} failed client(s)",
                            kind, outcome.workers_failed
                        );
                    } else {
                        info!("{} experiment finished", kind);
                    }
                    if !post_process {
                        None
                    } else if outcome.analyzable {
                        Some(self.analyze(kind, session, &outcome.failed_steps))
                    } else {
                        warn!("Not analyzing {} data of '{}': clients failed", kind, session);
                        None
                    }
                }
                Err(e) => {
                    error!("{} experiment failed: {}", kind, e);
                    None
                }
            };

            reports.push(ExperimentReport {
                kind,
                outcome,
                analysis,
            });
        }
        reports
    }

    /// Run the analysis of one kind over a session.
    pub fn analyze(&self, kind: ExperimentKind, session: &str, skip: &BTreeSet<usize>) -> Result<PathBuf> {
        let registration = self.registry.get(kind)?;
        let aggregator = Aggregator::new(self.store(session));
        let result = (registration.analyze)(&aggregator, skip);
        if let Err(e) = &result {
            error!("{} analysis of '{}' failed: {}", kind, session, e);
        }
        result
    }

    /// Analyze every experiment kind that has artifacts in `session`.
    pub fn post_process(&self, session: &str) -> Result<Vec<(ExperimentKind, Result<PathBuf>)>> {
        let aggregator = Aggregator::new(self.store(session));
        let kinds = aggregator.detect_kinds()?;
        if kinds.is_empty() {
            return Err(BenchError::NoResults {
                kind: ExperimentKind::SingleRun,
                dir: aggregator.store().session_dir().to_path_buf(),
            });
        }

        Ok(kinds
            .into_iter()
            .map(|kind| (kind, self.analyze(kind, session, &BTreeSet::new())))
            .collect())
    }

    /// Post-process several sessions; returns how many could not be fully analyzed.
    pub fn post_process_sessions(&self, sessions: &[String]) -> usize {
        let mut failures = 0;
        for session in sessions {
            info!("Post-processing session '{}'", session);
            match self.post_process(session) {
                Ok(results) => {
                    for (kind, result) in results {
                        match result {
                            Ok(path) => info!("{} summary: {}", kind, path.display()),
                            Err(_) => failures += 1,
                        }
                    }
                }
                Err(e) => {
                    error!("Session '{}' could not be post-processed: {}", session, e);
                    failures += 1;
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NodeId, SimulatedTarget};
    use crate::sample::OperationKind;
    use std::time::Duration;
    use tempfile::TempDir;

    fn shape() -> Arc<WorkloadShape> {
        Arc::new(WorkloadShape {
            num_requests: 3,
            data_size: 8,
            nodes: vec![NodeId::string(2, "TestDataPoint")],
            mode: Some(OperationKind::Read),
        })
    }

    fn target() -> SimulatedTarget {
        SimulatedTarget::new(&[NodeId::string(2, "TestDataPoint")], 8, Duration::from_millis(1))
    }

    fn params() -> RunParameters {
        RunParameters {
            n_clients: 2,
            client_counts: vec![1, 2],
        }
    }

    #[test]
    fn test_cli_names_and_analysis_kinds() {
        let names: Vec<_> = ExperimentKind::value_variants()
            .iter()
            .filter_map(|k| k.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["responsiveness_jitter_throughput", "scalability", "scalability_evolution"]
        );
        assert_eq!(ExperimentKind::ScalabilityEvolution.analysis_kind(), "scalability_Evolution");
    }

    #[test]
    fn test_registry_covers_every_kind() {
        let registry = ExperimentRegistry::with_defaults();
        for kind in ExperimentKind::ALL {
            assert!(registry.get(kind).is_ok(), "{}", kind);
        }
        assert!(ExperimentRegistry::empty().get(ExperimentKind::SingleRun).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_controller_runs_and_post_processes_every_kind() {
        let dir = TempDir::new().unwrap();
        let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());

        let reports = controller
            .run_experiments(
                &ExperimentKind::ALL,
                "all-kinds",
                Arc::new(target()),
                shape(),
                &params(),
                true,
            )
            .await;

        assert_eq!(reports.len(), 3);
        for report in &reports {
            assert!(report.outcome.is_ok(), "{:?}", report);
            assert!(matches!(report.analysis, Some(Ok(_))), "{:?}", report);
        }

        let results = dir.path().join("all-kinds/results");
        for name in [
            "response_times_summary.json",
            "scalability_summary.json",
            "scalability_Evolution_summary.json",
        ] {
            assert!(results.join(name).is_file(), "{}", name);
        }

        // post-process afterwards finds the same kinds
        let analyzed = controller.post_process("all-kinds").unwrap();
        assert_eq!(analyzed.len(), 3);
        assert!(analyzed.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_experiment_does_not_stop_the_next() {
        let dir = TempDir::new().unwrap();
        let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());
        let refusing = Arc::new(target().refuse_connections());

        let reports = controller
            .run_experiments(
                &[ExperimentKind::SingleRun, ExperimentKind::Scalability],
                "refused",
                refusing,
                shape(),
                &params(),
                true,
            )
            .await;

        assert!(matches!(
            reports[0].outcome,
            Err(BenchError::ProtocolOperation { .. })
        ));
        let second = reports[1].outcome.as_ref().unwrap();
        assert_eq!(second.workers_failed, 2);
        assert!(!second.analyzable);
        assert!(reports[1].analysis.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_evolution_steps_are_skipped_in_analysis() {
        let dir = TempDir::new().unwrap();
        let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());

        let reports = controller
            .run_experiments(
                &[ExperimentKind::ScalabilityEvolution],
                "flaky",
                Arc::new(target().fail_after(1)),
                shape(),
                &params(),
                true,
            )
            .await;

        let outcome = reports[0].outcome.as_ref().unwrap();
        assert_eq!(outcome.failed_steps, BTreeSet::from([1, 2]));
        // every step was skipped, so nothing is left to summarize
        assert!(matches!(
            reports[0].analysis,
            Some(Err(BenchError::NoResults { .. }))
        ));
    }

    #[test]
    fn test_post_process_of_unknown_session() {
        let dir = TempDir::new().unwrap();
        let controller = ExperimentController::new(ExperimentRegistry::with_defaults(), dir.path());
        assert!(matches!(
            controller.post_process("missing"),
            Err(BenchError::NoResults { .. })
        ));
        assert_eq!(controller.post_process_sessions(&["missing".to_string()]), 1);
    }
}
