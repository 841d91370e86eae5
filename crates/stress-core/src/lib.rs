//! Core types for dirstress.
//!
//! This crate holds everything the engine needs to know about a run before it
//! starts: the attack mode, the credential shape, the concurrency schedule,
//! think-time pacing and the thresholds evaluated once the run ends.
//!
//! A run is described by a fully resolved YAML file:
//!
//! ```yaml
//! target: ldap://10.0.0.5:389
//! base_dn: dc=corp,dc=local
//! bind_dn: cn=svc_stress,ou=Service,dc=corp,dc=local
//! password: secret
//! mode: search-complex
//! scenario:
//!   executor: ramping-vus
//!   stages:
//!     - { duration: 30s, target: 50 }
//!     - { duration: 10s, target: 0 }
//! thresholds:
//!   iteration_duration: ["p(95)<2000"]
//! ```

pub mod config;
pub mod duration;
pub mod error;
pub mod preset;
pub mod scenario;
pub mod threshold;
pub mod types;

pub use config::RunConfig;
pub use duration::{format_duration, parse_duration};
pub use error::ConfigError;
pub use preset::Preset;
pub use scenario::{ExecutorKind, ScenarioConfig, Stage, ThinkTime};
pub use threshold::{
    parse_threshold_expr, Aggregation, Comparison, MetricKind, ThresholdExpr, ThresholdMetric,
    ThresholdSet, ThresholdSpec,
};
pub use types::{AttackMode, CheckResult, Credential, SearchRequest, SearchScope};
