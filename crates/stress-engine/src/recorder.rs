//! Run-wide result stream.

use crate::metrics::{per_second_buckets, Trend, TrendSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use stress_core::CheckResult;
use tokio::time::Instant;

/// Why an iteration counted as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Dial,
    Auth,
    Operation,
}

/// Timing of one iteration that was not interrupted.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSample {
    /// Offset from the start of the run at which the iteration finished
    pub finished_at: Duration,
    /// Dial to close, think-time excluded
    pub duration: Duration,
    /// Bind plus operation latency; `None` when the dial failed
    pub response_time: Option<Duration>,
    pub failure: Option<FailureKind>,
}

/// Something that passed the wire but should not have.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub check: &'static str,
    pub dn: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl Anomaly {
    pub fn new(check: &'static str, dn: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            check,
            dn: dn.into(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Pass and fail counts of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: &'static str,
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// One second of the run timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SecondBucket {
    /// Whole seconds since the run started
    pub second: u64,
    /// Attempts that finished without a dial, auth or operation error
    pub completed: u64,
    /// Attempts that finished with one
    pub errors: u64,
    /// Mean iteration duration of the completed attempts; 0 when there were none
    pub avg_latency_ms: f64,
}

/// Bucket samples by the second they finished in.
///
/// Every second from 0 to the last sample is present, so quiet seconds show
/// up as empty buckets.
pub fn timeline(samples: &[IterationSample]) -> Vec<SecondBucket> {
    let mut buckets: Vec<SecondBucket> = Vec::new();
    let mut latency_sums: Vec<f64> = Vec::new();
    for sample in samples {
        let second = sample.finished_at.as_secs() as usize;
        if buckets.len() <= second {
            let start = buckets.len();
            buckets.extend((start..=second).map(|s| SecondBucket {
                second: s as u64,
                ..SecondBucket::default()
            }));
            latency_sums.resize(second + 1, 0.0);
        }
        let bucket = &mut buckets[second];
        if sample.failure.is_some() {
            bucket.errors += 1;
        } else {
            bucket.completed += 1;
            latency_sums[second] += sample.duration.as_micros() as f64 / 1000.0;
        }
    }
    for (bucket, sum) in buckets.iter_mut().zip(latency_sums) {
        if bucket.completed > 0 {
            bucket.avg_latency_ms = sum / bucket.completed as f64;
        }
    }
    buckets
}

/// Append-only sink shared by every worker.
///
/// All methods take `&self`; appends from concurrent iterations are
/// serialized by short mutex sections and atomic counters.
#[derive(Debug)]
pub struct ResultRecorder {
    started: Instant,
    checks: Mutex<Vec<CheckResult>>,
    samples: Mutex<Vec<IterationSample>>,
    anomalies: Mutex<Vec<Anomaly>>,
    interrupted: AtomicU64,
    write_fallbacks: AtomicU64,
    bytes_received: AtomicU64,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResultRecorder {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Recorder whose sample offsets are measured from `started`.
    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            checks: Mutex::new(Vec::new()),
            samples: Mutex::new(Vec::new()),
            anomalies: Mutex::new(Vec::new()),
            interrupted: AtomicU64::new(0),
            write_fallbacks: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Time since the run started.
    pub fn offset(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record(&self, check: CheckResult) {
        lock(&self.checks).push(check);
    }

    pub fn record_sample(&self, sample: IterationSample) {
        lock(&self.samples).push(sample);
    }

    pub fn record_anomaly(&self, anomaly: Anomaly) {
        lock(&self.anomalies).push(anomaly);
    }

    pub fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_fallback(&self) {
        self.write_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn check_count(&self) -> usize {
        lock(&self.checks).len()
    }

    /// Freeze the stream into a summary.
    ///
    /// Call only after every worker has been joined; anything recorded later
    /// lands in a fresh, empty stream.
    pub fn finish(&self, scheduled: Duration) -> RunSummary {
        let elapsed = self.offset();
        let checks = std::mem::take(&mut *lock(&self.checks));
        let samples = std::mem::take(&mut *lock(&self.samples));
        let anomalies = std::mem::take(&mut *lock(&self.anomalies));

        let mut by_name: BTreeMap<&'static str, CheckSummary> = BTreeMap::new();
        for check in &checks {
            let summary = by_name.entry(check.name).or_insert(CheckSummary {
                name: check.name,
                passes: 0,
                fails: 0,
            });
            if check.passed {
                summary.passes += 1;
            } else {
                summary.fails += 1;
            }
        }

        let count = |kind: FailureKind| samples.iter().filter(|s| s.failure == Some(kind)).count() as u64;
        let dial_errors = count(FailureKind::Dial);
        let auth_errors = count(FailureKind::Auth);
        let operation_errors = count(FailureKind::Operation);

        let iteration_trend = Trend::from_durations(
            samples
                .iter()
                .filter(|s| s.failure != Some(FailureKind::Dial))
                .map(|s| s.duration),
        );
        let response_trend = Trend::from_durations(samples.iter().filter_map(|s| s.response_time));

        RunSummary {
            scheduled_secs: scheduled.as_secs_f64(),
            elapsed_secs: elapsed.as_secs_f64(),
            iterations: samples.len() as u64 - dial_errors,
            attempts: samples.len() as u64,
            dial_errors,
            auth_errors,
            operation_errors,
            interrupted: self.interrupted.load(Ordering::Relaxed),
            write_fallbacks: self.write_fallbacks.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            peak_active: 0,
            checks: by_name.into_values().collect(),
            anomalies,
            orphaned_entries: Vec::new(),
            iterations_per_second: per_second_buckets(samples.iter().map(|s| s.finished_at)),
            timeline: timeline(&samples),
            iteration_duration: iteration_trend.summary(),
            response_time: response_trend.summary(),
            iteration_trend,
            response_trend,
            check_stream: checks,
        }
    }
}

impl Default for ResultRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen results of a run; the input to threshold evaluation and the report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub scheduled_secs: f64,
    pub elapsed_secs: f64,
    /// Iterations that reached the target and recorded a check
    pub iterations: u64,
    /// Completed iterations plus those whose dial failed
    pub attempts: u64,
    pub dial_errors: u64,
    pub auth_errors: u64,
    pub operation_errors: u64,
    /// Iterations cut off by a stop or ramp-down deadline
    pub interrupted: u64,
    /// Write-stress iterations that fell back to a read
    pub write_fallbacks: u64,
    pub bytes_received: u64,
    pub peak_active: u64,
    pub checks: Vec<CheckSummary>,
    pub anomalies: Vec<Anomaly>,
    /// Throwaway entries left on the server by interrupted write iterations
    pub orphaned_entries: Vec<String>,
    /// Attempts finished in each second of the run
    pub iterations_per_second: Vec<u64>,
    /// Completions, errors and latency for each second of the run
    pub timeline: Vec<SecondBucket>,
    pub iteration_duration: TrendSummary,
    pub response_time: TrendSummary,
    #[serde(skip)]
    pub iteration_trend: Trend,
    #[serde(skip)]
    pub response_trend: Trend,
    /// Every recorded check, in arrival order
    #[serde(skip)]
    pub check_stream: Vec<CheckResult>,
}

impl RunSummary {
    pub fn total_checks(&self) -> u64 {
        self.checks.iter().map(CheckSummary::total).sum()
    }

    pub fn passed_checks(&self) -> u64 {
        self.checks.iter().map(|c| c.passes).sum()
    }

    pub fn failed_checks(&self) -> u64 {
        self.checks.iter().map(|c| c.fails).sum()
    }

    /// Fraction of checks that passed; 0 when nothing was checked.
    pub fn checks_rate(&self) -> f64 {
        ratio(self.passed_checks(), self.total_checks())
    }

    /// Fraction of attempts that hit a dial, auth or operation error.
    pub fn error_rate(&self) -> f64 {
        ratio(
            self.dial_errors + self.auth_errors + self.operation_errors,
            self.attempts,
        )
    }

    /// Completed iterations per second of elapsed run time.
    pub fn iteration_rate(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.iterations as f64 / self.elapsed_secs
    }

    /// Seconds from the start of the run to the last finished attempt.
    pub fn active_secs(&self) -> u64 {
        self.iterations_per_second.len() as u64
    }

    pub fn peak_iterations_per_second(&self) -> u64 {
        self.iterations_per_second.iter().copied().max().unwrap_or(0)
    }

    pub fn average_iterations_per_second(&self) -> f64 {
        ratio(self.attempts, self.active_secs())
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(at_ms: u64, failure: Option<FailureKind>) -> IterationSample {
        IterationSample {
            finished_at: Duration::from_millis(at_ms),
            duration: Duration::from_millis(100),
            response_time: (failure != Some(FailureKind::Dial)).then(|| Duration::from_millis(40)),
            failure,
        }
    }

    #[test]
    fn test_summary_counts() {
        let recorder = ResultRecorder::new();
        recorder.record(CheckResult::new("search success", true));
        recorder.record(CheckResult::new("search success", true));
        recorder.record(CheckResult::new("search success", false));
        recorder.record_sample(sample(100, None));
        recorder.record_sample(sample(200, None));
        recorder.record_sample(sample(1200, Some(FailureKind::Operation)));
        recorder.record_sample(sample(1300, Some(FailureKind::Dial)));
        recorder.record_interrupted();

        let summary = recorder.finish(Duration::from_secs(10));
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.dial_errors, 1);
        assert_eq!(summary.operation_errors, 1);
        assert_eq!(summary.interrupted, 1);
        assert_eq!(summary.total_checks(), 3);
        assert!((summary.checks_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.error_rate(), 0.5);
        assert_eq!(summary.iterations_per_second, vec![2, 2]);
        assert_eq!(summary.peak_iterations_per_second(), 2);
        assert_eq!(summary.iteration_duration.count, 3);
        assert_eq!(summary.response_time.avg, 40.0);
        assert_eq!(summary.check_stream.len(), 3);
        assert_eq!(summary.timeline.len(), 2);
        assert_eq!(summary.timeline[1].errors, 2);
    }

    #[test]
    fn test_timeline() {
        let mut slow = sample(2500, None);
        slow.duration = Duration::from_millis(300);
        let samples = vec![
            sample(100, None),
            sample(900, Some(FailureKind::Auth)),
            slow,
            sample(2700, None),
            sample(2800, Some(FailureKind::Dial)),
        ];

        let buckets = timeline(&samples);
        assert_eq!(
            buckets,
            vec![
                SecondBucket {
                    second: 0,
                    completed: 1,
                    errors: 1,
                    avg_latency_ms: 100.0,
                },
                SecondBucket {
                    second: 1,
                    ..SecondBucket::default()
                },
                SecondBucket {
                    second: 2,
                    completed: 2,
                    errors: 1,
                    avg_latency_ms: 200.0,
                },
            ]
        );
        assert!(timeline(&[]).is_empty());
    }

    #[test]
    fn test_empty_summary() {
        let summary = ResultRecorder::new().finish(Duration::from_secs(1));
        assert_eq!(summary.checks_rate(), 0.0);
        assert_eq!(summary.error_rate(), 0.0);
        assert_eq!(summary.average_iterations_per_second(), 0.0);
        assert_eq!(summary.iteration_duration, TrendSummary::default());
    }

    #[test]
    fn test_concurrent_appends() {
        let recorder = Arc::new(ResultRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let recorder = Arc::clone(&recorder);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        recorder.record(CheckResult::new("bind success", i % 10 != 0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = recorder.finish(Duration::from_secs(1));
        assert_eq!(summary.total_checks(), 4000);
        assert_eq!(summary.failed_checks(), 400);
        assert_eq!(summary.checks.len(), 1);
    }

    #[test]
    fn test_summary_serializes_without_raw_streams() {
        let recorder = ResultRecorder::new();
        recorder.record(CheckResult::new("handled failure", false));
        recorder.record_anomaly(Anomaly::new(
            "handled failure",
            "cn=alice,dc=corp",
            "bind with the spray secret succeeded",
        ));
        let summary = recorder.finish(Duration::from_secs(1));
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("check_stream").is_none());
        assert_eq!(json["anomalies"][0]["dn"], "cn=alice,dc=corp");
        assert_eq!(json["checks"][0]["fails"], 1);
    }
}
