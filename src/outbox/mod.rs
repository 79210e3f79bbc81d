//! The retry engine: persisted side-effect intents, executed at least once.
//!
//! Collaborators enqueue an [`OutboxEntry`](crate::models::OutboxEntry); the
//! scheduler in [`crate::worker`] periodically asks the [`Processor`] to sweep
//! due entries through their registered executors.

pub mod backoff;
pub mod processor;

use uuid::Uuid;

use crate::db::StoreError;
use crate::models::{EntryError, EntryStatus};

pub use backoff::{BackoffPolicy, next_retry_delay};
pub use processor::{AttemptOutcome, Processor, SweepReport};

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error("entry {id} is {status} and cannot be retried")]
    Terminal { id: Uuid, status: EntryStatus },
    #[error("entry {0} has an attempt in flight")]
    Leased(Uuid),
    #[error("unknown action type: {0}")]
    UnknownActionType(String),
    #[error("invalid max_attempts: {0}")]
    InvalidMaxAttempts(i32),
}
