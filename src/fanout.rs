//! # Concurrent Fanout
//!
//! Spawns `n_clients` independent [`WorkloadRunner`]s against the same
//! target, one tokio task each, and joins every one of them. A failing or
//! panicking worker never cancels its siblings; its failure is recorded in
//! its own [`WorkerReport`].

use crate::error::{BenchError, Result};
use crate::identity::{RunIdentity, RunLayout};
use crate::protocol::ClientFactory;
use crate::sample::RunClock;
use crate::store::SampleStore;
use crate::workload::{WorkerReport, WorkloadRunner, WorkloadShape};
use std::sync::Arc;
use tracing::{error, info};

/// Reports of every worker of one fanout, ordered by client index.
#[derive(Debug)]
pub struct FanoutReport {
    pub n_clients: usize,
    pub evolution_step: Option<usize>,
    pub workers: Vec<WorkerReport>,
}

impl FanoutReport {
    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_workers() == 0
    }
}

pub struct ConcurrentFanout {
    factory: Arc<dyn ClientFactory>,
    shape: Arc<WorkloadShape>,
    store: SampleStore,
}

impl ConcurrentFanout {
    pub fn new(factory: Arc<dyn ClientFactory>, shape: Arc<WorkloadShape>, store: SampleStore) -> Self {
        Self {
            factory,
            shape,
            store,
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Run `n_clients` workers concurrently and wait for all of them.
    ///
    /// Fails before any worker starts if the workload is invalid or if
    /// artifacts of the same family are already present in the session.
    pub async fn run(&self, n_clients: usize, evolution_step: Option<usize>) -> Result<FanoutReport> {
        if n_clients == 0 {
            return Err(BenchError::config("number of clients must be at least 1"));
        }
        self.shape.validate()?;

        let layout = RunLayout::for_worker(0, evolution_step);
        self.store
            .ensure_vacant(layout.kind(), evolution_step, &self.shape.operations())?;

        info!(
            "Launching {} concurrent client(s) for session '{}'{}",
            n_clients,
            self.store.experiment_name(),
            evolution_step
                .map(|s| format!(", evolution step {}", s))
                .unwrap_or_default()
        );

        let clock = RunClock::start();
        let handles: Vec<_> = (0..n_clients)
            .map(|client_index| {
                let identity = RunIdentity::new(
                    self.store.experiment_name(),
                    RunLayout::for_worker(client_index, evolution_step),
                );
                let client = self.factory.create(&identity);
                let runner = WorkloadRunner::new(
                    identity.clone(),
                    Arc::clone(&self.shape),
                    self.store.clone(),
                    clock,
                    client,
                );
                (identity, tokio::spawn(runner.run()))
            })
            .collect();

        let mut workers = Vec::with_capacity(n_clients);
        for (identity, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(source) => {
                    let client_index = identity.client_index().unwrap_or_default();
                    error!("Worker {} of {} did not finish: {}", client_index, identity, source);
                    WorkerReport {
                        failure: Some(BenchError::WorkerPanicked {
                            experiment: identity.experiment_name.clone(),
                            client_index,
                            source,
                        }),
                        identity,
                        sets: Vec::new(),
                    }
                }
            };
            workers.push(report);
        }

        let report = FanoutReport {
            n_clients,
            evolution_step,
            workers,
        };
        info!(
            "Fanout of {} client(s) finished, {} failed",
            n_clients,
            report.failed_workers()
        );
        Ok(report)
    }
}
