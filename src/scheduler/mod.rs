//! Periodic tick schedules.
//!
//! Each schedule fires once at startup and then every `period`. A firing is
//! dropped while the previous tick of the same schedule is still running, so
//! a tick never overlaps itself. Every tick runs under `timeout`; a hung tick
//! is abandoned and the guard released. On cancellation the schedule stops
//! firing and waits for the tick in flight, so a settlement is never cut off
//! between the ledger write and the store write.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type TickFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Held for the lifetime of one tick.
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct TickSchedule {
    name: &'static str,
    period: Duration,
    timeout: Duration,
    running: Arc<AtomicBool>,
}

impl TickSchedule {
    pub fn new(name: &'static str, period: Duration, timeout: Duration) -> Self {
        Self {
            name,
            period,
            timeout,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `tick` on this schedule until `cancel` fires.
    pub fn spawn<F>(self, cancel: CancellationToken, tick: F) -> JoinHandle<()>
    where
        F: Fn() -> TickFuture + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let name = self.name;
            let timeout = self.timeout;
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                schedule = name,
                period_ms = self.period.as_millis() as u64,
                timeout_secs = timeout.as_secs(),
                "schedule started"
            );

            let mut in_flight: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let Some(guard) = RunningGuard::try_acquire(&self.running) else {
                    warn!(schedule = name, "previous tick still running, skipping");
                    continue;
                };

                let fut = tick();
                in_flight = Some(tokio::spawn(async move {
                    let _guard = guard;
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(Ok(())) => debug!(schedule = name, "tick complete"),
                        Ok(Err(e)) => error!(schedule = name, error = %format!("{e:#}"), "tick failed"),
                        Err(_) => error!(
                            schedule = name,
                            timeout_secs = timeout.as_secs(),
                            "tick timed out, abandoning"
                        ),
                    }
                }));
            }

            // Bounded by the tick's own timeout.
            if let Some(task) = in_flight.filter(|t| !t.is_finished()) {
                info!(schedule = name, "waiting for in-flight tick");
                if let Err(e) = task.await {
                    error!(schedule = name, error = %e, "in-flight tick aborted");
                }
            }

            info!(schedule = name, "schedule stopped");
        })
    }
}
