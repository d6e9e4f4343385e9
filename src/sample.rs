//! # Sample Recording
//!
//! The atomic unit of measurement is a [`Sample`]: one request's start and end
//! timestamps, the payload size it moved and whether it was a read or a write.
//! Derived quantities (responsiveness, throughput) are computed on demand and
//! never stored.
//!
//! Samples are validated on construction: a sample whose end precedes its
//! start is rejected with [`BenchError::InvalidSample`] and never reaches a
//! [`SampleSet`].

use crate::error::{BenchError, Result};
use crate::identity::SampleSetId;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Kind of request issued against the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    /// Both kinds in the order a combined run executes them.
    pub const ALL: [OperationKind; 2] = [OperationKind::Read, OperationKind::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }

    /// Kinds a runner executes for an optional mode filter.
    pub fn selected(filter: Option<OperationKind>) -> Vec<OperationKind> {
        match filter {
            Some(kind) => vec![kind],
            None => Self::ALL.to_vec(),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read" => Ok(OperationKind::Read),
            "write" => Ok(OperationKind::Write),
            other => Err(format!("unknown operation kind '{}'", other)),
        }
    }
}

/// One measured request. Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    start_time: f64,
    end_time: f64,
    payload_size: usize,
    operation: OperationKind,
}

impl Sample {
    /// Build a sample from one timing observation.
    ///
    /// Pure construction: no I/O, the caller owns persistence.
    pub fn record(
        operation: OperationKind,
        started_at: f64,
        ended_at: f64,
        payload_size: usize,
    ) -> Result<Self> {
        if !started_at.is_finite() || !ended_at.is_finite() || ended_at < started_at {
            return Err(BenchError::InvalidSample {
                started_at,
                ended_at,
            });
        }
        Ok(Self {
            start_time: started_at,
            end_time: ended_at,
            payload_size,
            operation,
        })
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Wall-clock duration of the request in seconds.
    pub fn responsiveness(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Bytes per second, or `None` for a zero-duration observation.
    pub fn throughput(&self) -> Option<f64> {
        let responsiveness = self.responsiveness();
        if responsiveness > 0.0 {
            Some(self.payload_size as f64 / responsiveness)
        } else {
            None
        }
    }
}

/// The ordered samples one worker produced for one coordinate.
///
/// Append-only while its runner is active; treated as immutable once persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    id: SampleSetId,
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(id: SampleSetId) -> Self {
        Self {
            id,
            samples: Vec::new(),
        }
    }

    pub(crate) fn from_samples(id: SampleSetId, samples: Vec<Sample>) -> Self {
        Self { id, samples }
    }

    pub fn id(&self) -> &SampleSetId {
        &self.id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }
}

/// Wall-clock timestamps that advance monotonically.
///
/// The wall clock is read once; afterwards time advances with the tokio
/// monotonic clock, so a wall-clock step can never yield a negative
/// responsiveness and paused test time is honored.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    wall_anchor: f64,
    mono_anchor: Instant,
}

impl RunClock {
    pub fn start() -> Self {
        let wall_anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self {
            wall_anchor,
            mono_anchor: Instant::now(),
        }
    }

    /// Current time in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        self.wall_anchor + self.mono_anchor.elapsed().as_secs_f64()
    }
}
