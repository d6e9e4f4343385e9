//! # Aggregation
//!
//! Reads persisted SampleSets back and rolls them up:
//!
//! 1. one [`SummaryStat`] per SampleSet,
//! 2. one [`AggregateStat`] per concurrency level, the mean of its workers'
//!    summaries,
//! 3. for evolution sessions, one [`AggregateStat`] per
//!    `(operation, evolution step)` pair.
//!
//! Grouping works on parsed [`SampleSetId`]s only. Groups are visited in
//! `(operation, client count)` order and their members in client-index
//! order, so repeated runs over the same artifacts produce byte-identical
//! summaries.
//!
//! A group whose set count does not match its client count is reported as
//! [`BenchError::IncompleteRun`] and left out; the other groups proceed.

use crate::error::{BenchError, Result};
use crate::experiment::ExperimentKind;
use crate::identity::SampleSetId;
use crate::metrics::{AggregateStat, SummaryStat};
use crate::sample::OperationKind;
use crate::store::SampleStore;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// JSON object whose keys keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedSummary<T>(Vec<(String, T)>);

impl<T> OrderedSummary<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: T) {
        self.0.push((key.into(), value));
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for OrderedSummary<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serialize for OrderedSummary<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Outcome of one analysis.
#[derive(Debug)]
pub struct Analysis<T> {
    pub summary: OrderedSummary<T>,
    /// Where the summary JSON was written.
    pub path: PathBuf,
    /// Groups left out of the summary, with the reason.
    pub skipped: Vec<BenchError>,
}

pub struct Aggregator {
    store: SampleStore,
}

impl Aggregator {
    pub fn new(store: SampleStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Experiment kinds with at least one artifact in the session.
    pub fn detect_kinds(&self) -> Result<BTreeSet<ExperimentKind>> {
        Ok(self
            .store
            .discover()?
            .iter()
            .map(|id| id.identity.layout.kind())
            .collect())
    }

    /// Summary of a single-client session, keyed `read_mode` / `write_mode`.
    pub fn single_run(&self) -> Result<Analysis<SummaryStat>> {
        let kind = ExperimentKind::SingleRun;
        let groups = self.groups(kind, |_| ())?;

        let mut summary = OrderedSummary::new();
        for ((operation, ()), members) in groups {
            // one set per operation kind by construction of the file name
            for id in members {
                let stat = SummaryStat::from_set(&self.store.load(&id)?)?;
                summary.push(mode_key(operation), stat);
            }
        }

        self.finish(kind, summary, Vec::new())
    }

    /// Mean-of-means per operation kind over one scalability fanout.
    ///
    /// The artifact names do not carry the client count, so it is taken to be
    /// one past the highest client index found under any operation. Every
    /// operation of a fanout runs on the same workers, so a mode that lost
    /// its highest-index artifact is still reported incomplete.
    pub fn scalability(&self) -> Result<Analysis<AggregateStat>> {
        let kind = ExperimentKind::Scalability;
        let groups = self.groups(kind, |_| ())?;

        let expected = groups
            .values()
            .flatten()
            .filter_map(|id| id.identity.client_index())
            .max()
            .map_or(0, |max| max + 1);
        let sizes: BTreeSet<usize> = groups.values().map(Vec::len).collect();
        if sizes.len() > 1 {
            warn!(
                "Scalability artifacts of '{}' differ in count across modes: {:?}",
                self.name(),
                sizes
            );
        }

        let mut summary = OrderedSummary::new();
        let mut skipped = Vec::new();
        for ((operation, ()), members) in groups {
            let result = self
                .check_complete(kind, operation, None, &members, expected)
                .and_then(|()| self.roll_up(&members));
            match result {
                Ok(stat) => summary.push(mode_key(operation), stat),
                Err(e) => {
                    error!("Skipping {} mode of '{}': {}", operation, self.name(), e);
                    skipped.push(e);
                }
            }
        }

        self.finish(kind, summary, skipped)
    }

    /// Mean-of-means per `(operation, evolution step)`, keyed
    /// `<op>_mode_<client count>`.
    ///
    /// Steps in `skip` (for instance steps whose workers failed during an
    /// immediate post-process) are left out without being checked.
    pub fn evolution(&self, skip: &BTreeSet<usize>) -> Result<Analysis<AggregateStat>> {
        let kind = ExperimentKind::ScalabilityEvolution;
        let groups = self.groups(kind, |id| id.identity.evolution_step().unwrap_or_default())?;

        let mut summary = OrderedSummary::new();
        let mut skipped = Vec::new();
        for ((operation, step), members) in groups {
            if skip.contains(&step) {
                warn!(
                    "Leaving evolution step {} ({} mode) of '{}' out of the analysis",
                    step,
                    operation,
                    self.name()
                );
                continue;
            }
            let result = self
                .check_complete(kind, operation, Some(step), &members, step)
                .and_then(|()| self.roll_up(&members));
            match result {
                Ok(stat) => summary.push(format!("{}_{}", mode_key(operation), step), stat),
                Err(e) => {
                    error!("Skipping evolution step {} of '{}': {}", step, self.name(), e);
                    skipped.push(e);
                }
            }
        }

        self.finish(kind, summary, skipped)
    }

    fn name(&self) -> &str {
        self.store.experiment_name()
    }

    /// Artifacts of one kind grouped by `(operation, key)`, both ascending.
    fn groups<K: Ord>(
        &self,
        kind: ExperimentKind,
        key: impl Fn(&SampleSetId) -> K,
    ) -> Result<BTreeMap<(OperationKind, K), Vec<SampleSetId>>> {
        let mut groups: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for id in self.store.discover()? {
            if id.identity.layout.kind() != kind {
                continue;
            }
            groups
                .entry((id.operation, key(&id)))
                .or_default()
                .push(id);
        }
        for members in groups.values_mut() {
            members.sort();
        }

        if groups.is_empty() {
            return Err(BenchError::NoResults {
                kind,
                dir: self.store.session_dir().to_path_buf(),
            });
        }
        Ok(groups)
    }

    /// The group must hold exactly one set per client index `0..expected`.
    fn check_complete(
        &self,
        kind: ExperimentKind,
        operation: OperationKind,
        evolution_step: Option<usize>,
        members: &[SampleSetId],
        expected: usize,
    ) -> Result<()> {
        let indices: BTreeSet<usize> = members
            .iter()
            .filter_map(|id| id.identity.client_index())
            .collect();
        let complete = members.len() == expected && indices.iter().copied().eq(0..expected);

        if complete {
            Ok(())
        } else {
            Err(BenchError::IncompleteRun {
                experiment: self.name().to_string(),
                kind,
                operation,
                evolution_step,
                expected,
                found: members.len(),
            })
        }
    }

    fn roll_up(&self, members: &[SampleSetId]) -> Result<AggregateStat> {
        let mut stats = Vec::with_capacity(members.len());
        for id in members {
            let set = self.store.load(id)?;
            stats.push(SummaryStat::from_set(&set)?);
        }
        AggregateStat::mean_of(&stats)
            .ok_or_else(|| BenchError::config(format!("no sample sets to aggregate in '{}'", self.name())))
    }

    fn finish<T: Serialize>(
        &self,
        kind: ExperimentKind,
        summary: OrderedSummary<T>,
        mut skipped: Vec<BenchError>,
    ) -> Result<Analysis<T>> {
        if summary.is_empty() {
            // nothing usable: surface the reason instead of writing `{}`
            return Err(if skipped.is_empty() {
                BenchError::NoResults {
                    kind,
                    dir: self.store.session_dir().to_path_buf(),
                }
            } else {
                skipped.remove(0)
            });
        }

        let path = self.store.write_summary(kind.analysis_kind(), &summary)?;
        info!(
            "{} analysis of '{}' written to {}",
            kind,
            self.name(),
            path.display()
        );
        Ok(Analysis {
            summary,
            path,
            skipped,
        })
    }
}

fn mode_key(operation: OperationKind) -> String {
    format!("{}_mode", operation)
}
