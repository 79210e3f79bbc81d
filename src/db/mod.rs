pub mod memory;
pub mod outbox_entries;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{EntryError, EntryStatus, OutboxEntry};

pub use memory::MemoryOutboxStore;
pub use outbox_entries::PgOutboxStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("outbox entry {0} not found")]
    NotFound(Uuid),
    #[error("outbox entry {id} was modified concurrently (expected version {expected})")]
    Conflict { id: Uuid, expected: i64 },
    #[error("corrupt outbox row: {0}")]
    Corrupt(#[from] EntryError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Durable home of outbox entries.
///
/// `save` is a full-row upsert guarded by `OutboxEntry::version`: it only
/// succeeds when the stored version matches the one the caller loaded
/// (0 for an entry that has never been saved), and bumps the caller's
/// version on success. A mismatch yields `StoreError::Conflict` and writes
/// nothing.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn save(&self, entry: &mut OutboxEntry) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: Uuid) -> Result<OutboxEntry, StoreError>;

    /// Up to `limit` non-terminal entries in creation order: pending, failed,
    /// and claimed entries whose lease expired before `now`. Backoff is not
    /// applied here.
    async fn list_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn count_by_status(&self) -> Result<Vec<(EntryStatus, i64)>, StoreError>;
}
