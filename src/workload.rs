//! # Workload Runner
//!
//! One logical client: connect once, issue `num_requests` sequential
//! operations per selected operation kind, disconnect, persist.
//!
//! Every request addresses the full node list in a single bulk call and is
//! timed as one sample. Write payloads are regenerated with random content
//! before every request so the target cannot serve them from a cache.
//!
//! A failing request ends the runner early (including a pending write phase
//! in combined mode); the samples collected so far are still persisted.

use crate::error::{BenchError, Result};
use crate::identity::{RunIdentity, SampleSetId};
use crate::metrics::LatencyProfile;
use crate::protocol::{NodeId, ProtocolClient};
use crate::sample::{OperationKind, RunClock, Sample, SampleSet};
use crate::store::SampleStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What every worker of an experiment does.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadShape {
    pub num_requests: usize,
    /// Bytes written per node and request.
    pub data_size: usize,
    pub nodes: Vec<NodeId>,
    /// `None` runs reads, then writes.
    pub mode: Option<OperationKind>,
}

impl WorkloadShape {
    pub fn validate(&self) -> Result<()> {
        if self.num_requests == 0 {
            return Err(BenchError::config("num_requests must be at least 1"));
        }
        if self.nodes.is_empty() {
            return Err(BenchError::config("no nodes to query"));
        }
        if self.data_size == 0 && self.mode != Some(OperationKind::Read) {
            return Err(BenchError::config("data_size must be at least 1"));
        }
        Ok(())
    }

    pub fn operations(&self) -> Vec<OperationKind> {
        OperationKind::selected(self.mode)
    }

    /// Keep only the first `limit` nodes.
    pub fn cap_nodes(&mut self, limit: usize) {
        self.nodes.truncate(limit);
    }
}

/// What a runner leaves behind.
#[derive(Debug)]
pub struct WorkerReport {
    pub identity: RunIdentity,
    /// Non-empty sample sets, each already persisted.
    pub sets: Vec<SampleSet>,
    pub failure: Option<BenchError>,
}

impl WorkerReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn sample_count(&self) -> usize {
        self.sets.iter().map(SampleSet::len).sum()
    }
}

pub struct WorkloadRunner {
    identity: RunIdentity,
    shape: Arc<WorkloadShape>,
    store: SampleStore,
    clock: RunClock,
    client: Box<dyn ProtocolClient>,
    rng: StdRng,
}

impl WorkloadRunner {
    pub fn new(
        identity: RunIdentity,
        shape: Arc<WorkloadShape>,
        store: SampleStore,
        clock: RunClock,
        client: Box<dyn ProtocolClient>,
    ) -> Self {
        Self {
            identity,
            shape,
            store,
            clock,
            client,
            rng: StdRng::from_entropy(),
        }
    }

    /// Run the workload to completion or to its first failure.
    pub async fn run(mut self) -> WorkerReport {
        info!(
            "Starting {} client for {} ({} request(s) per mode)",
            self.client.name(),
            self.identity,
            self.shape.num_requests
        );

        let mut sets = Vec::new();
        let mut failure = None;

        match self.client.connect().await {
            Ok(()) => {
                for operation in self.shape.operations() {
                    let (set, error) = self.measure(operation).await;
                    sets.push(set);
                    if error.is_some() {
                        failure = error;
                        break;
                    }
                }
                if let Err(e) = self.client.disconnect().await {
                    warn!("Disconnect failed for {}: {:#}", self.identity, e);
                }
            }
            Err(source) => {
                failure = Some(BenchError::ProtocolOperation {
                    coordinate: self.identity.to_string(),
                    action: "connect",
                    request: 0,
                    source,
                });
            }
        }

        sets.retain(|set| !set.is_empty());
        for set in &sets {
            if let Err(e) = self.store.persist(set) {
                error!("Could not persist samples of {}: {}", set.id(), e);
                failure.get_or_insert(e);
            }
            match LatencyProfile::from_set(set) {
                Ok(profile) => info!("{}: {}", set.id(), profile),
                Err(e) => warn!("No latency profile for {}: {:#}", set.id(), e),
            }
        }

        if let Some(e) = &failure {
            error!("Client for {} stopped early: {}", self.identity, e);
        }

        WorkerReport {
            identity: self.identity,
            sets,
            failure,
        }
    }

    /// Issue `num_requests` operations of one kind.
    ///
    /// Returns the samples collected and the error that stopped the loop, if any.
    async fn measure(&mut self, operation: OperationKind) -> (SampleSet, Option<BenchError>) {
        let id = SampleSetId::new(self.identity.clone(), operation);
        let mut set = SampleSet::new(id.clone());

        for request in 1..=self.shape.num_requests {
            let values = match operation {
                OperationKind::Read => Vec::new(),
                OperationKind::Write => self.fresh_payload(),
            };

            let started_at = self.clock.now();
            let outcome = match operation {
                OperationKind::Read => self
                    .client
                    .read(&self.shape.nodes)
                    .await
                    .map(|values| values.iter().map(Vec::len).sum::<usize>()),
                OperationKind::Write => self
                    .client
                    .write(&self.shape.nodes, &values)
                    .await
                    .map(|()| self.shape.data_size * self.shape.nodes.len()),
            };
            let ended_at = self.clock.now();

            let payload_size = match outcome {
                Ok(size) => size,
                Err(source) => {
                    let error = BenchError::ProtocolOperation {
                        coordinate: id.to_string(),
                        action: operation.as_str(),
                        request,
                        source,
                    };
                    return (set, Some(error));
                }
            };

            match Sample::record(operation, started_at, ended_at, payload_size) {
                Ok(sample) => {
                    debug!(
                        "{} request {}: {:.6}s, {} bytes",
                        id,
                        request,
                        sample.responsiveness(),
                        payload_size
                    );
                    set.push(sample);
                }
                Err(e) => warn!("Anomalous timing for {} request {}: {}", id, request, e),
            }
        }

        (set, None)
    }

    fn fresh_payload(&mut self) -> Vec<Vec<u8>> {
        (0..self.shape.nodes.len())
            .map(|_| {
                let mut value = vec![0u8; self.shape.data_size];
                self.rng.fill(&mut value[..]);
                value
            })
            .collect()
    }
}
