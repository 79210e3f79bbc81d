use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EntryStatus, OutboxEntry, OutboxRow};

use super::{OutboxStore, StoreError};

/// Insert a never-saved entry. Returns false if the id already exists.
pub async fn insert(pool: &PgPool, entry: &OutboxEntry) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO outbox_entries
            (id, action_type, payload, status, attempts, max_attempts, last_attempted_at,
             created_at, external_id, error_message, lease_expires_at, version)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(entry.id)
    .bind(&entry.action_type)
    .bind(&entry.payload)
    .bind(entry.status.as_str())
    .bind(entry.attempts)
    .bind(entry.max_attempts)
    .bind(entry.last_attempted_at)
    .bind(entry.created_at)
    .bind(&entry.external_id)
    .bind(&entry.error_message)
    .bind(entry.lease_expires_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Overwrite every mutable column if the stored version still matches.
/// Returns false when the row is missing or was written by someone else.
pub async fn update_if_version(pool: &PgPool, entry: &OutboxEntry) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE outbox_entries
         SET action_type = $2,
             payload = $3,
             status = $4,
             attempts = $5,
             max_attempts = $6,
             last_attempted_at = $7,
             external_id = $8,
             error_message = $9,
             lease_expires_at = $10,
             version = version + 1
         WHERE id = $1 AND version = $11",
    )
    .bind(entry.id)
    .bind(&entry.action_type)
    .bind(&entry.payload)
    .bind(entry.status.as_str())
    .bind(entry.attempts)
    .bind(entry.max_attempts)
    .bind(entry.last_attempted_at)
    .bind(&entry.external_id)
    .bind(&entry.error_message)
    .bind(entry.lease_expires_at)
    .bind(entry.version)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OutboxRow>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRow>("SELECT * FROM outbox_entries WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_pending(
    pool: &PgPool,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<Vec<OutboxRow>, sqlx::Error> {
    sqlx::query_as::<_, OutboxRow>(
        "SELECT * FROM outbox_entries
         WHERE status IN ('pending', 'failed')
            OR (status = 'claimed' AND (lease_expires_at IS NULL OR lease_expires_at <= $1))
         ORDER BY created_at ASC, id ASC
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM outbox_entries GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await
}

pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn save(&self, entry: &mut OutboxEntry) -> Result<(), StoreError> {
        let written = if entry.version == 0 {
            insert(&self.pool, entry).await?
        } else {
            update_if_version(&self.pool, entry).await?
        };

        if written {
            entry.version += 1;
            return Ok(());
        }

        if entry.version != 0 && find_by_id(&self.pool, entry.id).await?.is_none() {
            return Err(StoreError::NotFound(entry.id));
        }
        Err(StoreError::Conflict {
            id: entry.id,
            expected: entry.version,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<OutboxEntry, StoreError> {
        let row = find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        Ok(OutboxEntry::try_from(row)?)
    }

    async fn list_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        list_pending(&self.pool, limit, now)
            .await?
            .into_iter()
            .map(|row| OutboxEntry::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn count_by_status(&self) -> Result<Vec<(EntryStatus, i64)>, StoreError> {
        count_by_status(&self.pool)
            .await?
            .into_iter()
            .map(|(status, count)| Ok::<_, StoreError>((status.parse::<EntryStatus>()?, count)))
            .collect()
    }
}
