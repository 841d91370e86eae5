//! Target concurrency over time.

use std::time::Duration;
use stress_core::{ExecutorKind, ScenarioConfig, Stage};

/// Piecewise schedule derived from a scenario's stages.
///
/// For `ramping-vus` the target moves linearly from the previous stage's
/// target (or `start_vus`) to the stage target, rounded down. For
/// `constant-vus` each stage holds its target for its whole duration.
#[derive(Debug, Clone, PartialEq)]
pub struct RampSchedule {
    executor: ExecutorKind,
    start_vus: u64,
    stages: Vec<Stage>,
}

impl RampSchedule {
    pub fn new(scenario: &ScenarioConfig) -> Self {
        Self {
            executor: scenario.executor,
            start_vus: scenario.start_vus,
            stages: scenario.stages.clone(),
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> u64 {
        let stage_max = self.stages.iter().map(|s| s.target).max().unwrap_or(0);
        match self.executor {
            ExecutorKind::RampingVus => stage_max.max(self.start_vus),
            ExecutorKind::ConstantVus => stage_max,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Index of the stage containing `elapsed`, or `None` past the end.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }
        None
    }

    /// Scheduled concurrency at `elapsed`, or `None` once the schedule is over.
    pub fn target_at(&self, elapsed: Duration) -> Option<u64> {
        let mut stage_start = Duration::ZERO;
        let mut from = self.start_vus;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return Some(match self.executor {
                    ExecutorKind::ConstantVus => stage.target,
                    ExecutorKind::RampingVus => {
                        interpolate(from, stage.target, elapsed - stage_start, stage.duration)
                    }
                });
            }
            stage_start = stage_end;
            from = stage.target;
        }
        None
    }
}

/// `floor(from + (to - from) * progress / span)` without floating point.
fn interpolate(from: u64, to: u64, progress: Duration, span: Duration) -> u64 {
    let span = span.as_nanos() as i128;
    if span == 0 {
        return to;
    }
    let progress = progress.as_nanos() as i128;
    let (from, to) = (from as i128, to as i128);
    let scaled = from * span + (to - from) * progress;
    scaled.div_euclid(span).max(0) as u64
}
