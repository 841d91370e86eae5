//! Trend statistics and throughput buckets.

use serde::Serialize;
use std::time::Duration;
use stress_core::Aggregation;

/// Sorted sample set for a trend metric (values in milliseconds).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trend {
    sorted: Vec<f64>,
}

impl Trend {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        Self { sorted: values }
    }

    pub fn from_durations<I: IntoIterator<Item = Duration>>(durations: I) -> Self {
        Self::from_values(
            durations
                .into_iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn avg(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.sorted.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.sorted.last().copied().unwrap_or(0.0)
    }

    pub fn med(&self) -> f64 {
        self.percentile(50.0)
    }

    /// Nearest-rank percentile: the value at index `floor(len * p / 100)`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let rank = (self.sorted.len() as f64 * p.clamp(0.0, 100.0) / 100.0).floor() as usize;
        self.sorted[rank.min(self.sorted.len() - 1)]
    }

    /// Trend aggregations. Empty trends evaluate to 0.
    pub fn aggregate(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Avg => Some(self.avg()),
            Aggregation::Min => Some(self.min()),
            Aggregation::Max => Some(self.max()),
            Aggregation::Med => Some(self.med()),
            Aggregation::Percentile(p) => Some(self.percentile(p)),
            Aggregation::Count => Some(self.sorted.len() as f64),
            Aggregation::Rate => None,
        }
    }

    pub fn summary(&self) -> TrendSummary {
        TrendSummary {
            count: self.sorted.len(),
            avg: self.avg(),
            min: self.min(),
            med: self.med(),
            p90: self.percentile(90.0),
            p95: self.percentile(95.0),
            max: self.max(),
        }
    }
}

/// Serializable digest of a [`Trend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub max: f64,
}

/// Count events per whole second since the run started.
///
/// The result covers every second from 0 up to the last event, so quiet
/// seconds appear as zero.
pub fn per_second_buckets<I: IntoIterator<Item = Duration>>(offsets: I) -> Vec<u64> {
    let mut buckets: Vec<u64> = Vec::new();
    for offset in offsets {
        let second = offset.as_secs() as usize;
        if buckets.len() <= second {
            buckets.resize(second + 1, 0);
        }
        buckets[second] += 1;
    }
    buckets
}
