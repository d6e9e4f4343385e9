//! # Scalability Driver
//!
//! Sweeps the client count: one [`ConcurrentFanout`] per entry of the list,
//! strictly one after the other so concurrency levels never overlap. Each
//! fanout is tagged with an evolution step equal to its client count.

use crate::error::Result;
use crate::fanout::{ConcurrentFanout, FanoutReport};
use crate::utils::validate_client_counts;
use std::collections::BTreeSet;
use tracing::{error, info, warn};

/// Result of one step of the sweep.
#[derive(Debug)]
pub struct StepOutcome {
    pub client_count: usize,
    pub result: Result<FanoutReport>,
}

impl StepOutcome {
    /// A step is clean when its fanout ran and every worker succeeded.
    pub fn is_clean(&self) -> bool {
        matches!(&self.result, Ok(report) if report.all_succeeded())
    }
}

#[derive(Debug)]
pub struct EvolutionOutcome {
    pub steps: Vec<StepOutcome>,
}

impl EvolutionOutcome {
    /// Evolution steps whose data must not be aggregated.
    pub fn failed_steps(&self) -> BTreeSet<usize> {
        self.steps
            .iter()
            .filter(|step| !step.is_clean())
            .map(|step| step.client_count)
            .collect()
    }
}

pub struct ScalabilityDriver {
    fanout: ConcurrentFanout,
}

impl ScalabilityDriver {
    pub fn new(fanout: ConcurrentFanout) -> Self {
        Self { fanout }
    }

    /// Run one fanout per client count, in list order.
    ///
    /// A failing step does not stop later steps. Only an invalid list fails
    /// the whole sweep, before anything runs.
    pub async fn run(&self, client_counts: &[usize]) -> Result<EvolutionOutcome> {
        validate_client_counts(client_counts)?;
        info!(
            "Scalability evolution over client counts {:?} for session '{}'",
            client_counts,
            self.fanout.store().experiment_name()
        );

        let mut steps = Vec::with_capacity(client_counts.len());
        for &client_count in client_counts {
            let result = self.fanout.run(client_count, Some(client_count)).await;
            match &result {
                Ok(report) if !report.all_succeeded() => warn!(
                    "Evolution step {}: {} of {} client(s) failed; step excluded from analysis",
                    client_count,
                    report.failed_workers(),
                    client_count
                ),
                Ok(_) => info!("Evolution step {} complete", client_count),
                Err(e) => error!("Evolution step {} did not run: {}", client_count, e),
            }
            steps.push(StepOutcome {
                client_count,
                result,
            });
        }

        Ok(EvolutionOutcome { steps })
    }
}
