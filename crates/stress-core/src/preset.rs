//! Preset schedules.

use crate::scenario::{ExecutorKind, ScenarioConfig, Stage};
use crate::threshold::{
    Aggregation, Comparison, ThresholdExpr, ThresholdMetric, ThresholdSet, ThresholdSpec,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ramp-down tail appended to the login storm schedule.
pub const LOGIN_STORM_RAMP_DOWN: Duration = Duration::from_secs(10);

/// Scenario plus the thresholds that go with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub scenario: ScenarioConfig,
    pub thresholds: ThresholdSet,
}

impl Preset {
    /// Bind storm: ramp to `vus` over `ramp_up`, hold for `hold`, drain over 10s.
    ///
    /// Fails the run when p95 response time reaches 2s or more than 1% of
    /// iterations error out.
    pub fn login_storm(ramp_up: Duration, hold: Duration, vus: u64) -> Self {
        let scenario = ScenarioConfig {
            name: "login_storm".to_string(),
            executor: ExecutorKind::RampingVus,
            start_vus: 0,
            stages: vec![
                Stage::new(ramp_up, vus),
                Stage::new(hold, vus),
                Stage::new(LOGIN_STORM_RAMP_DOWN, 0),
            ],
            graceful_stop: Duration::ZERO,
            graceful_ramp_down: Duration::from_secs(30),
        };

        let thresholds = ThresholdSet::new(vec![
            ThresholdSpec::new(
                ThresholdMetric::ResponseTime,
                vec![ThresholdExpr::new(
                    Aggregation::Percentile(95.0),
                    Comparison::Lt,
                    2000.0,
                )],
            ),
            ThresholdSpec::new(
                ThresholdMetric::Errors,
                vec![ThresholdExpr::new(Aggregation::Rate, Comparison::Lt, 0.01)],
            ),
        ]);

        Self {
            scenario,
            thresholds,
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
