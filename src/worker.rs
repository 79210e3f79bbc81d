use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::models::OutboxEntry;
use crate::outbox::{OutboxError, Processor};

/// Periodic driver for [`Processor::process_pending`].
pub struct Scheduler {
    processor: Arc<Processor>,
    interval: Duration,
    sweep_timeout: Duration,
}

/// Owns the running sweep task. Dropping it without calling
/// [`SchedulerHandle::shutdown`] leaves the task stopping on its own once the
/// shutdown channel closes.
pub struct SchedulerHandle {
    processor: Arc<Processor>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(processor: Arc<Processor>, interval: Duration, sweep_timeout: Duration) -> Self {
        Self {
            processor,
            interval,
            sweep_timeout,
        }
    }

    pub fn from_config(processor: Arc<Processor>) -> Self {
        let interval = processor.config().sweep_interval;
        let sweep_timeout = processor.config().sweep_timeout;
        Self::new(processor, interval, sweep_timeout)
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let processor = self.processor.clone();
        let task = tokio::spawn(run(self.processor, self.interval, self.sweep_timeout, rx));

        tracing::info!(
            "Outbox scheduler started (every {:?}, sweep timeout {:?})",
            self.interval,
            self.sweep_timeout
        );

        SchedulerHandle {
            processor,
            shutdown,
            task,
        }
    }
}

impl SchedulerHandle {
    /// Retry one entry now, outside the periodic cycle.
    pub async fn process_single(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        self.processor.process_single(id).await
    }

    pub async fn abandon_entry(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        self.processor.abandon_entry(id).await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop scheduling sweeps and wait for the current one to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Outbox scheduler task failed: {e}");
        }
        tracing::info!("Outbox scheduler stopped");
    }
}

async fn run(
    processor: Arc<Processor>,
    interval: Duration,
    sweep_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        // None only when the timeout is too large to represent; sweep unbounded.
        let deadline = Instant::now().checked_add(sweep_timeout);
        match processor.process_pending_until(deadline).await {
            Ok(report) if report.attempted() > 0 || report.errors > 0 => {
                tracing::info!(
                    "Outbox sweep: {} succeeded, {} failed, {} unroutable, {} exhausted, {} errors",
                    report.succeeded,
                    report.failed,
                    report.unroutable,
                    report.exhausted,
                    report.errors
                );
            }
            Ok(report) => {
                tracing::debug!("Outbox sweep idle ({} fetched, {} not due)", report.fetched, report.not_due);
            }
            Err(e) => {
                tracing::error!("Outbox sweep failed: {e}");
            }
        }
    }
}
