//! Admission control for iterations.

use crate::schedule::RampSchedule;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Decides when a worker may start an iteration.
///
/// An iteration is admitted only while the number of active iterations is
/// strictly below the schedule's target at the admission instant. The
/// target is read from the schedule on every admission; the executor's
/// controller calls [`IterationGate::refresh`] on a fixed tick so waiting
/// workers notice a rising target and running ones notice a falling one.
///
/// When the target falls below the active count, permits can *retire*:
/// a retiring iteration finishes early and stops counting toward the excess
/// that other permits may still claim.
#[derive(Debug)]
pub struct IterationGate {
    schedule: RampSchedule,
    started: Instant,
    active: AtomicU64,
    retiring: AtomicU64,
    peak_active: AtomicU64,
    admitted: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl IterationGate {
    /// Create a gate whose schedule clock starts now.
    pub fn new(schedule: RampSchedule) -> Self {
        Self {
            schedule,
            started: Instant::now(),
            active: AtomicU64::new(0),
            retiring: AtomicU64::new(0),
            peak_active: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn schedule(&self) -> &RampSchedule {
        &self.schedule
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Scheduled concurrency right now; zero once closed or past the end.
    pub fn target(&self) -> u64 {
        if self.is_closed() {
            return 0;
        }
        self.schedule.target_at(self.elapsed()).unwrap_or(0)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> u64 {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Iterations admitted since the gate was created.
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::SeqCst)
    }

    /// Active iterations above the current target that have not yet retired.
    pub fn excess(&self) -> u64 {
        let active = self.active.load(Ordering::SeqCst);
        let retiring = self.retiring.load(Ordering::SeqCst);
        active
            .saturating_sub(retiring)
            .saturating_sub(self.target())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Admit an iteration if the active count is below the target.
    pub fn try_enter(&self) -> Option<GatePermit<'_>> {
        let mut active = self.active.load(Ordering::SeqCst);
        loop {
            if active >= self.target() {
                return None;
            }
            match self.active.compare_exchange_weak(
                active,
                active + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.peak_active.fetch_max(active + 1, Ordering::SeqCst);
                    self.admitted.fetch_add(1, Ordering::SeqCst);
                    return Some(GatePermit {
                        gate: self,
                        retiring: false,
                    });
                }
                Err(current) => active = current,
            }
        }
    }

    /// Wait for admission. Returns `None` once the gate is closed.
    pub async fn enter(&self) -> Option<GatePermit<'_>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            if let Some(permit) = self.try_enter() {
                return Some(permit);
            }
            notified.await;
        }
    }

    /// Wake every waiting worker so it re-reads the schedule.
    pub fn refresh(&self) {
        self.notify.notify_waiters();
    }

    /// Stop admitting iterations.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once the gate is closed.
    pub async fn closed(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    fn try_claim_retirement(&self) -> bool {
        let mut retiring = self.retiring.load(Ordering::SeqCst);
        loop {
            let active = self.active.load(Ordering::SeqCst);
            if active.saturating_sub(retiring) <= self.target() {
                return false;
            }
            match self.retiring.compare_exchange_weak(
                retiring,
                retiring + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(current) => retiring = current,
            }
        }
    }
}

/// One admitted iteration. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a IterationGate,
    retiring: bool,
}

impl GatePermit<'_> {
    pub fn is_retiring(&self) -> bool {
        self.retiring
    }

    /// Claim one unit of excess concurrency for this iteration.
    ///
    /// Returns true if this permit is (now) retiring. Never retires once
    /// the gate is closed, since the stop deadline takes over from there.
    pub fn retire(&mut self) -> bool {
        if !self.retiring && !self.gate.is_closed() && self.gate.try_claim_retirement() {
            self.retiring = true;
        }
        self.retiring
    }

    /// Resolves when this permit retires because the target dropped.
    ///
    /// Never resolves after the gate is closed.
    pub async fn retired(&mut self) {
        loop {
            let notified = self.gate.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.retire() {
                return;
            }
            if self.gate.is_closed() {
                std::future::pending::<()>().await;
            }
            notified.await;
        }
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        if self.retiring {
            self.gate.retiring.fetch_sub(1, Ordering::SeqCst);
        }
        self.gate.active.fetch_sub(1, Ordering::SeqCst);
        self.gate.notify.notify_waiters();
    }
}
