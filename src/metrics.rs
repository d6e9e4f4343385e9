use crate::error::{BenchError, Result};
use crate::sample::SampleSet;
use crate::utils::{format_duration_secs, format_rate};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Statistics of a single SampleSet.
///
/// Field names are the keys of the single-run summary JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStat {
    pub responsiveness_mean: f64,
    /// Standard deviation of responsiveness.
    pub jitter: f64,
    pub throughput_mean: f64,
    pub throughput_std: f64,
}

impl SummaryStat {
    /// Compute the statistics of one worker's samples.
    ///
    /// Zero-duration samples count towards responsiveness but are left out of
    /// the throughput statistics.
    pub fn from_set(set: &SampleSet) -> Result<Self> {
        if set.is_empty() {
            return Err(BenchError::config(format!(
                "sample set for {} is empty",
                set.id()
            )));
        }

        let responsiveness: Vec<f64> = set.samples().iter().map(|s| s.responsiveness()).collect();
        let throughput: Vec<f64> = set.samples().iter().filter_map(|s| s.throughput()).collect();

        let skipped = responsiveness.len() - throughput.len();
        if skipped > 0 {
            warn!(
                "{} zero-duration sample(s) in {} left out of throughput statistics",
                skipped,
                set.id()
            );
        }

        let (responsiveness_mean, jitter) = mean_and_std(&responsiveness);
        let (throughput_mean, throughput_std) = mean_and_std(&throughput);

        Ok(Self {
            responsiveness_mean,
            jitter,
            throughput_mean,
            throughput_std,
        })
    }
}

/// Mean of per-worker [`SummaryStat`]s.
///
/// Every worker weighs the same regardless of how many samples it produced;
/// this is not the pooled statistic over all raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub responsiveness_mean: f64,
    pub jitter_mean: f64,
    pub throughput_mean: f64,
    pub throughput_mean_std: f64,
}

impl AggregateStat {
    /// Mean of means. Returns `None` when there is nothing to combine.
    pub fn mean_of(children: &[SummaryStat]) -> Option<Self> {
        if children.is_empty() {
            return None;
        }
        let mean = |f: fn(&SummaryStat) -> f64| mean(&children.iter().map(f).collect::<Vec<_>>());
        Some(Self {
            responsiveness_mean: mean(|s| s.responsiveness_mean),
            jitter_mean: mean(|s| s.jitter),
            throughput_mean: mean(|s| s.throughput_mean),
            throughput_mean_std: mean(|s| s.throughput_std),
        })
    }
}

/// Percentile value pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ns: u64,
}

/// Latency distribution of one SampleSet, logged after each worker finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub total_samples: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub percentiles: Vec<PercentileValue>,
    pub mean_throughput: f64,
}

impl LatencyProfile {
    pub const PERCENTILES: [f64; 3] = [50.0, 95.0, 99.0];

    pub fn from_set(set: &SampleSet) -> anyhow::Result<Self> {
        // 3 significant figures, auto-resizing
        let mut histogram = Histogram::<u64>::new(3)?;
        for sample in set.samples() {
            let ns = (sample.responsiveness() * 1e9).round() as u64;
            histogram.record(ns)?;
        }

        let percentiles = Self::PERCENTILES
            .iter()
            .map(|&p| PercentileValue {
                percentile: p,
                value_ns: histogram.value_at_percentile(p),
            })
            .collect();

        let throughput: Vec<f64> = set.samples().iter().filter_map(|s| s.throughput()).collect();

        Ok(Self {
            total_samples: set.len(),
            min_ns: histogram.min(),
            max_ns: histogram.max(),
            mean_ns: histogram.mean(),
            percentiles,
            mean_throughput: mean(&throughput),
        })
    }
}

impl std::fmt::Display for LatencyProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} samples, mean {}, min {}, max {}",
            self.total_samples,
            format_duration_secs(self.mean_ns / 1e9),
            format_duration_secs(self.min_ns as f64 / 1e9),
            format_duration_secs(self.max_ns as f64 / 1e9),
        )?;
        for p in &self.percentiles {
            write!(
                f,
                ", p{} {}",
                p.percentile,
                format_duration_secs(p.value_ns as f64 / 1e9)
            )?;
        }
        write!(f, ", throughput {}", format_rate(self.mean_throughput))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean and sample (n - 1) standard deviation. Fewer than two values give a
/// deviation of 0.0.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let m = mean(values);
    if values.len() < 2 {
        return (m, 0.0);
    }
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    (m, variance.sqrt())
}
