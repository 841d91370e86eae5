//! Directory stress workload engine.
//!
//! [`ScenarioExecutor`] drives a pool of virtual users through a ramp
//! schedule. Each iteration selects a credential, opens a connection through
//! a [`DirectoryConnector`](directory_client::DirectoryConnector), runs the
//! run's [`AttackMode`](stress_core::AttackMode) and records exactly one
//! named check. When the schedule ends, the recorded stream is frozen into a
//! [`RunSummary`], thresholds are evaluated, and a [`StressReport`] carries
//! the verdict.
//!
//! ```ignore
//! let executor = ScenarioExecutor::new(config, LdapConnector::new(timeout), credentials);
//! let summary = executor.run().await;
//! let report = StressReport::new(&config, summary);
//! println!("{}", format_table(&report));
//! ```

pub mod attack;
pub mod executor;
pub mod gate;
mod iteration;
pub mod metrics;
pub mod random;
pub mod recorder;
pub mod report;
pub mod schedule;
pub mod thresholds;

pub use attack::{AttackDispatcher, AttackOutcome};
pub use executor::ScenarioExecutor;
pub use gate::{GatePermit, IterationGate};
pub use metrics::{per_second_buckets, Trend, TrendSummary};
pub use random::RandomSource;
pub use recorder::{
    timeline, Anomaly, CheckSummary, FailureKind, IterationSample, ResultRecorder, RunSummary,
    SecondBucket,
};
pub use report::{format_table, FailureCount, RunStatus, StressReport};
pub use schedule::RampSchedule;
pub use thresholds::{evaluate_thresholds, ThresholdOutcome};
