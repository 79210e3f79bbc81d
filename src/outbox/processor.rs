use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{BackoffPolicy, OutboxError};
use crate::config::OutboxConfig;
use crate::db::{OutboxStore, StoreError};
use crate::executors::{ExecutionContext, ExecutorError, ExecutorRegistry};
use crate::models::{EntryStatus, OutboxEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    Unroutable,
    Exhausted,
}

/// Tally of one `process_pending` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub not_due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unroutable: usize,
    pub exhausted: usize,
    /// Lost the claim to a concurrent writer.
    pub conflicts: usize,
    /// Store errors; the entry will be replayed from its last saved state.
    pub errors: usize,
    /// Left for the next sweep because the deadline passed.
    pub deferred: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Succeeded => self.succeeded += 1,
            AttemptOutcome::Failed => self.failed += 1,
            AttemptOutcome::Unroutable => self.unroutable += 1,
            AttemptOutcome::Exhausted => self.exhausted += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.unroutable + self.exhausted
    }
}

pub struct Processor {
    store: Arc<dyn OutboxStore>,
    executors: ExecutorRegistry,
    config: OutboxConfig,
}

impl Processor {
    pub fn new(store: Arc<dyn OutboxStore>, executors: ExecutorRegistry, config: OutboxConfig) -> Self {
        Self {
            store,
            executors,
            config,
        }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.config.base_delay, self.config.max_delay)
    }

    /// Persist a new pending entry for a registered action type.
    pub async fn enqueue(
        &self,
        action_type: &str,
        payload: serde_json::Value,
        max_attempts: Option<i32>,
    ) -> Result<OutboxEntry, OutboxError> {
        if !self.executors.contains(action_type) {
            return Err(OutboxError::UnknownActionType(action_type.to_string()));
        }
        let max_attempts = max_attempts.unwrap_or(self.config.default_max_attempts);
        if max_attempts <= 0 {
            return Err(OutboxError::InvalidMaxAttempts(max_attempts));
        }

        let mut entry = OutboxEntry::new(action_type, payload, max_attempts);
        self.store.save(&mut entry).await?;

        tracing::debug!("Enqueued outbox entry {} ({action_type})", entry.id);
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        Ok(self.store.get_by_id(id).await?)
    }

    pub async fn list_pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, OutboxError> {
        Ok(self.store.list_pending(limit, Utc::now()).await?)
    }

    pub async fn stats(&self) -> Result<Vec<(EntryStatus, i64)>, OutboxError> {
        Ok(self.store.count_by_status().await?)
    }

    pub async fn process_pending(&self) -> Result<SweepReport, OutboxError> {
        self.process_pending_until(None).await
    }

    /// Sweep one batch sequentially. The deadline is only checked between
    /// entries; an executor call that has started always runs to completion.
    pub async fn process_pending_until(
        &self,
        deadline: Option<Instant>,
    ) -> Result<SweepReport, OutboxError> {
        let entries = self
            .store
            .list_pending(self.config.batch_size, Utc::now())
            .await?;
        let backoff = self.backoff();

        let total = entries.len();
        let mut report = SweepReport {
            fetched: total,
            ..SweepReport::default()
        };

        for (index, mut entry) in entries.into_iter().enumerate() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                report.deferred = total - index;
                tracing::warn!(
                    "Sweep deadline reached, deferring {} outbox entries",
                    report.deferred
                );
                break;
            }

            if entry.is_terminal() {
                continue;
            }

            if !entry.is_due(Utc::now(), backoff.base_delay, backoff.max_delay) {
                report.not_due += 1;
                continue;
            }

            let result = if entry.attempts >= self.effective_max_attempts(&entry) {
                self.exhaust(&mut entry).await
            } else {
                self.attempt(&mut entry).await
            };

            match result {
                Ok(outcome) => report.record(outcome),
                Err(OutboxError::Store(StoreError::Conflict { .. })) => {
                    tracing::debug!("Outbox entry {} claimed elsewhere, skipping", entry.id);
                    report.conflicts += 1;
                }
                Err(e) => {
                    tracing::error!("Outbox entry {} not processed: {e}", entry.id);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Operator-triggered retry that ignores the backoff window.
    pub async fn process_single(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        let mut entry = self.store.get_by_id(id).await?;

        if entry.is_terminal() {
            return Err(OutboxError::Terminal {
                id,
                status: entry.status,
            });
        }
        if entry.is_leased(Utc::now()) {
            return Err(OutboxError::Leased(id));
        }

        let outcome = self.attempt(&mut entry).await?;
        tracing::info!("Manual retry of outbox entry {id}: {outcome:?}");
        Ok(entry)
    }

    /// Force an entry into the terminal abandoned state, whatever it was.
    /// An attempt still in flight loses its final save to this write.
    pub async fn abandon_entry(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        let mut entry = self.store.get_by_id(id).await?;
        let previous = entry.status;
        entry.mark_abandoned();
        self.store.save(&mut entry).await?;

        tracing::info!("Abandoned outbox entry {id} (was {previous})");
        Ok(entry)
    }

    fn effective_max_attempts(&self, entry: &OutboxEntry) -> i32 {
        self.config
            .max_attempts_override
            .unwrap_or(entry.max_attempts)
    }

    async fn exhaust(&self, entry: &mut OutboxEntry) -> Result<AttemptOutcome, OutboxError> {
        tracing::warn!(
            "Outbox entry {} ({}) exhausted {} attempts: {}",
            entry.id,
            entry.action_type,
            entry.attempts,
            entry.error_message.as_deref().unwrap_or("no error recorded")
        );
        entry.mark_exhausted();
        self.store.save(entry).await?;
        Ok(AttemptOutcome::Exhausted)
    }

    /// Claim, execute, record. The claim is saved before the executor runs so
    /// a concurrent caller holding the same version loses with a conflict.
    async fn attempt(&self, entry: &mut OutboxEntry) -> Result<AttemptOutcome, OutboxError> {
        entry.claim(Utc::now(), self.config.lease_duration)?;
        self.store.save(entry).await?;

        let ctx = ExecutionContext {
            entry_id: entry.id,
            attempt: entry.attempts,
        };

        tracing::debug!(
            "Executing outbox entry {} (action={}, attempt={})",
            entry.id,
            entry.action_type,
            entry.attempts
        );

        let result = match self.executors.get(&entry.action_type) {
            Some(executor) => match tokio::time::timeout(
                self.config.execute_timeout,
                executor.execute(&ctx, &entry.payload),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecutorError::transient(format!(
                    "Execution timed out after {:?}",
                    self.config.execute_timeout
                ))),
            },
            None => Err(ExecutorError::permanent(format!(
                "No executor registered for action type '{}'",
                entry.action_type
            ))),
        };

        let outcome = match result {
            Ok(external_id) => {
                entry.mark_success(external_id);
                AttemptOutcome::Succeeded
            }
            Err(e) if e.is_permanent() => {
                tracing::warn!("Outbox entry {} is unroutable: {e}", entry.id);
                entry.mark_unroutable(&e);
                AttemptOutcome::Unroutable
            }
            Err(e) => {
                entry.mark_failed(&e);
                if entry.attempts >= self.effective_max_attempts(entry) {
                    tracing::warn!(
                        "Outbox entry {} ({}) exhausted {} attempts: {e}",
                        entry.id,
                        entry.action_type,
                        entry.attempts
                    );
                    entry.mark_exhausted();
                    AttemptOutcome::Exhausted
                } else {
                    tracing::debug!("Outbox entry {} failed: {e}", entry.id);
                    AttemptOutcome::Failed
                }
            }
        };

        if let Err(e) = self.store.save(entry).await {
            tracing::error!(
                "Failed to persist {outcome:?} for outbox entry {}: {e}",
                entry.id
            );
            return Err(e.into());
        }

        Ok(outcome)
    }
}
