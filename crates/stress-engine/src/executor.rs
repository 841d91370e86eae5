//! Scenario executor: worker pool, schedule controller and stop deadlines.

use crate::attack::AttackDispatcher;
use crate::gate::IterationGate;
use crate::iteration::{RunContext, Worker};
use crate::recorder::{ResultRecorder, RunSummary};
use crate::schedule::RampSchedule;
use directory_client::DirectoryConnector;
use std::sync::Arc;
use std::time::Duration;
use stress_core::{format_duration, RunConfig};
use stress_credential_source::CredentialProvider;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often the controller re-reads the schedule.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Runs one scenario to completion.
///
/// Spawns one worker per VU the schedule can ask for, lets the
/// [`IterationGate`] decide which of them are active, and drives the gate
/// from a controller loop. When the schedule ends, the gate closes, in-flight
/// iterations get `graceful_stop` to finish, and then their operation phase is
/// interrupted. The summary is built only after every worker has been joined.
pub struct ScenarioExecutor<C: DirectoryConnector> {
    config: Arc<RunConfig>,
    connector: C,
    credentials: CredentialProvider,
    tick: Duration,
}

impl<C: DirectoryConnector> ScenarioExecutor<C> {
    pub fn new(config: RunConfig, connector: C, credentials: CredentialProvider) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            credentials,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub async fn run(self) -> RunSummary {
        let schedule = RampSchedule::new(&self.config.scenario);
        let max_vus = schedule.max_target();
        let total = schedule.total_duration();
        let gate = IterationGate::new(schedule);
        let recorder = ResultRecorder::starting_at(gate.started_at());

        let context = Arc::new(RunContext {
            address: self.config.target_url(),
            dispatcher: AttackDispatcher::from_config(&self.config),
            config: Arc::clone(&self.config),
            connector: self.connector,
            credentials: self.credentials,
            gate,
            recorder,
            stop: CancellationToken::new(),
        });

        info!(
            scenario = %context.config.scenario.name,
            mode = %context.config.mode,
            target = %context.address,
            "Starting run: up to {} workers over {}",
            max_vus,
            format_duration(total)
        );

        let workers: Vec<_> = (0..max_vus)
            .map(|index| tokio::spawn(Worker::new(index, Arc::clone(&context)).run()))
            .collect();

        drive_schedule(&context, self.tick).await;

        context.gate.close();
        let graceful_stop = context.config.scenario.graceful_stop;
        info!(
            "Schedule complete, {} in-flight iterations have {} to finish",
            context.gate.active(),
            format_duration(graceful_stop)
        );

        let stopper = {
            let stop = context.stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(graceful_stop).await;
                stop.cancel();
            })
        };
        for (index, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                warn!(worker = index, "Worker task failed: {}", e);
            }
        }
        stopper.abort();

        let mut summary = context.recorder.finish(total);
        summary.peak_active = context.gate.peak_active();
        summary.orphaned_entries = context.dispatcher.orphaned_entries();
        info!(
            iterations = summary.iterations,
            checks = summary.total_checks(),
            failed_checks = summary.failed_checks(),
            interrupted = summary.interrupted,
            "Run finished after {:.1}s",
            summary.elapsed_secs
        );
        summary
    }
}

/// Publish the schedule to the gate until it ends.
async fn drive_schedule<C: DirectoryConnector>(context: &RunContext<C>, tick: Duration) {
    let gate = &context.gate;
    let schedule = gate.schedule();
    let stages = schedule.stages();

    let end = tokio::time::sleep_until(gate.started_at() + schedule.total_duration());
    tokio::pin!(end);
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut next_progress = Instant::now() + PROGRESS_INTERVAL;
    let mut current_stage = None;

    loop {
        tokio::select! {
            _ = &mut end => break,
            _ = ticker.tick() => {}
        }

        let stage = schedule.stage_index_at(gate.elapsed());
        if stage != current_stage {
            if let Some(index) = stage {
                info!(
                    "Stage {}/{}: target {} workers over {}",
                    index + 1,
                    stages.len(),
                    stages[index].target,
                    format_duration(stages[index].duration)
                );
            }
            current_stage = stage;
        }

        if Instant::now() >= next_progress {
            info!(
                active = gate.active(),
                target = gate.target(),
                checks = context.recorder.check_count(),
                "Run in progress"
            );
            next_progress += PROGRESS_INTERVAL;
        }

        gate.refresh();
    }
}
