//! One virtual user's iteration loop.

use crate::attack::{AttackDispatcher, AttackOutcome};
use crate::gate::{GatePermit, IterationGate};
use crate::random::RandomSource;
use crate::recorder::{FailureKind, IterationSample, ResultRecorder};
use directory_client::{ConnectionGuard, DialError, DirectoryConnector};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use stress_core::{Credential, RunConfig};
use stress_credential_source::CredentialProvider;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// State every worker of a run reads.
pub(crate) struct RunContext<C: DirectoryConnector> {
    pub config: Arc<RunConfig>,
    pub address: String,
    pub connector: C,
    pub credentials: CredentialProvider,
    pub dispatcher: AttackDispatcher,
    pub gate: IterationGate,
    pub recorder: ResultRecorder,
    /// Cancelled when the graceful stop deadline passes
    pub stop: CancellationToken,
}

impl<C: DirectoryConnector> RunContext<C> {
    /// Resolves when the in-flight phase of the iteration holding `permit`
    /// must be abandoned: at the hard stop, or `graceful_ramp_down` after the
    /// permit retires.
    async fn interruption(&self, permit: &mut GatePermit<'_>) {
        let ramp_down = async {
            permit.retired().await;
            debug!("Iteration retiring, {:?} left to finish", self.config.scenario.graceful_ramp_down);
            tokio::time::sleep(self.config.scenario.graceful_ramp_down).await;
        };
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = ramp_down => {}
        }
    }
}

enum Phase {
    Completed(AttackOutcome),
    DialFailed(DialError),
    Interrupted,
}

pub(crate) struct Worker<C: DirectoryConnector> {
    index: u64,
    context: Arc<RunContext<C>>,
    random: RandomSource,
}

impl<C: DirectoryConnector> Worker<C> {
    pub fn new(index: u64, context: Arc<RunContext<C>>) -> Self {
        let random = RandomSource::for_worker(context.config.seed, index);
        Self {
            index,
            context,
            random,
        }
    }

    /// Run iterations until the gate closes.
    pub async fn run(mut self) {
        let context = Arc::clone(&self.context);
        let mut iterations = 0u64;
        while let Some(mut permit) = context.gate.enter().await {
            self.iteration(&context, &mut permit).await;
            iterations += 1;
        }
        debug!(worker = self.index, iterations, "Worker finished");
    }

    async fn iteration(&mut self, context: &RunContext<C>, permit: &mut GatePermit<'_>) {
        let started = Instant::now();
        let credential = context.credentials.next(self.random.rng()).clone();

        let phase = {
            let interrupt = context.interruption(permit);
            tokio::pin!(interrupt);
            self.connect_and_attack(context, &credential, interrupt.as_mut())
                .await
        };
        let duration = started.elapsed();

        let (response_time, failure) = match phase {
            Phase::Interrupted => {
                debug!(worker = self.index, "Iteration interrupted");
                context.recorder.record_interrupted();
                return;
            }
            Phase::DialFailed(e) => {
                debug!(worker = self.index, "{}", e);
                (None, Some(FailureKind::Dial))
            }
            Phase::Completed(outcome) => {
                let recorder = &context.recorder;
                recorder.record(outcome.check);
                if let Some(anomaly) = outcome.anomaly {
                    recorder.record_anomaly(anomaly);
                }
                if outcome.write_fallback {
                    recorder.record_write_fallback();
                }
                recorder.add_bytes_received(outcome.bytes_received);
                (Some(outcome.response_time), outcome.failure)
            }
        };

        context.recorder.record_sample(IterationSample {
            finished_at: context.recorder.offset(),
            duration,
            response_time,
            failure,
        });

        if !permit.is_retiring() {
            self.think(context, permit).await;
        }
    }

    /// open → bind → operate → close. Close runs on every path that opened.
    async fn connect_and_attack<F>(
        &mut self,
        context: &RunContext<C>,
        credential: &Credential,
        mut interrupt: Pin<&mut F>,
    ) -> Phase
    where
        F: Future<Output = ()>,
    {
        let conn = tokio::select! {
            biased;
            _ = interrupt.as_mut() => return Phase::Interrupted,
            opened = context.connector.open(&context.address) => match opened {
                Ok(conn) => conn,
                Err(e) => return Phase::DialFailed(e),
            },
        };

        let mut guard = ConnectionGuard::new(conn);
        let phase = match guard.connection() {
            Some(conn) => tokio::select! {
                biased;
                _ = interrupt.as_mut() => Phase::Interrupted,
                outcome = context.dispatcher.execute(conn, credential, &mut self.random) => {
                    Phase::Completed(outcome)
                }
            },
            None => Phase::Interrupted,
        };
        guard.close().await;
        phase
    }

    /// Think-time, cut short when this iteration retires or the run ends.
    async fn think(&mut self, context: &RunContext<C>, permit: &mut GatePermit<'_>) {
        let pause = self.random.think_time(&context.config.think_time);
        if pause.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = permit.retired() => debug!(worker = self.index, "Think-time cut short by ramp-down"),
            _ = context.gate.closed() => {}
        }
    }
}
