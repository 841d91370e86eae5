//! Concurrency schedule and pacing configuration.

use crate::duration::{format_duration, serde_str};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the executor moves between stage targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Each stage holds its target for the whole stage.
    ConstantVus,
    /// Linear interpolation from the previous target to the stage target.
    #[default]
    RampingVus,
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::ConstantVus => write!(f, "constant-vus"),
            ExecutorKind::RampingVus => write!(f, "ramping-vus"),
        }
    }
}

/// One step of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "serde_str")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Longest schedule a run file may describe.
pub const MAX_SCHEDULE_DURATION: Duration = Duration::from_secs(366 * 24 * 3600);

fn default_scenario_name() -> String {
    "default".to_string()
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// Concurrency schedule for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Scenario name (used in logs and the report)
    #[serde(default = "default_scenario_name")]
    pub name: String,
    #[serde(default)]
    pub executor: ExecutorKind,
    /// Active workers at t=0 for a ramping executor
    #[serde(default)]
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    /// Time in-flight iterations get to finish once the schedule ends
    #[serde(default = "default_graceful_stop", with = "serde_str")]
    pub graceful_stop: Duration,
    /// Time in-flight iterations get to finish when the target drops below them
    #[serde(default = "default_graceful_stop", with = "serde_str")]
    pub graceful_ramp_down: Duration,
}

impl ScenarioConfig {
    /// Create a ramping scenario.
    pub fn ramping(start_vus: u64, stages: Vec<Stage>) -> Self {
        Self {
            name: default_scenario_name(),
            executor: ExecutorKind::RampingVus,
            start_vus,
            stages,
            graceful_stop: default_graceful_stop(),
            graceful_ramp_down: default_graceful_stop(),
        }
    }

    /// Create a fixed-concurrency scenario with a single stage.
    pub fn constant(vus: u64, duration: Duration) -> Self {
        Self {
            name: default_scenario_name(),
            executor: ExecutorKind::ConstantVus,
            start_vus: vus,
            stages: vec![Stage::new(duration, vus)],
            graceful_stop: default_graceful_stop(),
            graceful_ramp_down: default_graceful_stop(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    pub fn with_graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    /// Sum of all stage durations, saturating at `Duration::MAX`.
    pub fn total_duration(&self) -> Duration {
        self.checked_total_duration().unwrap_or(Duration::MAX)
    }

    /// Sum of all stage durations, or `None` on overflow.
    pub fn checked_total_duration(&self) -> Option<Duration> {
        self.stages
            .iter()
            .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
    }

    /// Largest number of workers the schedule can ever ask for.
    pub fn max_vus(&self) -> u64 {
        let stage_max = self.stages.iter().map(|s| s.target).max().unwrap_or(0);
        match self.executor {
            ExecutorKind::RampingVus => stage_max.max(self.start_vus),
            ExecutorKind::ConstantVus => stage_max,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::InvalidScenario(
                "at least one stage is required".to_string(),
            ));
        }
        let total = self.checked_total_duration().ok_or_else(|| {
            ConfigError::InvalidScenario("total stage duration is out of range".to_string())
        })?;
        if total.is_zero() {
            return Err(ConfigError::InvalidScenario(
                "total stage duration must be greater than zero".to_string(),
            ));
        }
        if total > MAX_SCHEDULE_DURATION {
            return Err(ConfigError::InvalidScenario(format!(
                "total stage duration must not exceed {}",
                format_duration(MAX_SCHEDULE_DURATION)
            )));
        }
        if self.max_vus() == 0 {
            return Err(ConfigError::InvalidScenario(
                "every stage targets zero workers".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_think_min() -> Duration {
    Duration::from_millis(500)
}

fn default_think_max() -> Duration {
    Duration::from_millis(2500)
}

/// Uniformly random pause at the end of every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThinkTime {
    #[serde(default = "default_think_min", with = "serde_str")]
    pub min: Duration,
    #[serde(default = "default_think_max", with = "serde_str")]
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self {
            min: default_think_min(),
            max: default_think_max(),
        }
    }
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// No pause between iterations.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn fixed(d: Duration) -> Self {
        Self::new(d, d)
    }

    pub fn mean(&self) -> Duration {
        (self.min + self.max) / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "think_time.min ({:?}) is greater than think_time.max ({:?})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}
