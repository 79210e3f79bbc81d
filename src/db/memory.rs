use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use crate::models::{EntryStatus, OutboxEntry};

use super::{OutboxStore, StoreError};

/// Process-local store with the same versioning rules as Postgres.
/// Used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryOutboxStore {
    entries: DashMap<Uuid, OutboxEntry>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn save(&self, entry: &mut OutboxEntry) -> Result<(), StoreError> {
        match self.entries.entry(entry.id) {
            Entry::Occupied(mut slot) => {
                let stored = slot.get();
                if stored.version != entry.version {
                    return Err(StoreError::Conflict {
                        id: entry.id,
                        expected: entry.version,
                    });
                }
                entry.created_at = stored.created_at;
                entry.version += 1;
                slot.insert(entry.clone());
            }
            Entry::Vacant(slot) => {
                if entry.version != 0 {
                    return Err(StoreError::NotFound(entry.id));
                }
                entry.version = 1;
                slot.insert(entry.clone());
            }
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<OutboxEntry, StoreError> {
        self.entries
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_pending(
        &self,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let mut pending: Vec<OutboxEntry> = self
            .entries
            .iter()
            .filter(|entry| match entry.status {
                EntryStatus::Pending | EntryStatus::Failed => true,
                EntryStatus::Claimed => !entry.is_leased(now),
                _ => false,
            })
            .map(|entry| entry.clone())
            .collect();

        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn count_by_status(&self) -> Result<Vec<(EntryStatus, i64)>, StoreError> {
        let counts = EntryStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let count = self
                    .entries
                    .iter()
                    .filter(|entry| entry.status == status)
                    .count() as i64;
                (count > 0).then_some((status, count))
            })
            .collect();
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn entry(action_type: &str) -> OutboxEntry {
        OutboxEntry::new(action_type, json!({}), 5)
    }

    #[tokio::test]
    async fn save_then_get() {
        let store = MemoryOutboxStore::new();
        let mut e = entry("email");
        store.save(&mut e).await.unwrap();
        assert_eq!(e.version, 1);

        let loaded = store.get_by_id(e.id).await.unwrap();
        assert_eq!(loaded, e);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryOutboxStore::new();
        let id = Uuid::now_v7();
        assert!(matches!(
            store.get_by_id(id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let store = MemoryOutboxStore::new();
        let mut e = entry("email");
        store.save(&mut e).await.unwrap();

        let mut first = store.get_by_id(e.id).await.unwrap();
        let mut second = store.get_by_id(e.id).await.unwrap();

        first.mark_success("msg-1");
        store.save(&mut first).await.unwrap();

        second.mark_abandoned();
        let err = store.save(&mut second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 1, .. }));

        let stored = store.get_by_id(e.id).await.unwrap();
        assert_eq!(stored.status, EntryStatus::Succeeded);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let store = MemoryOutboxStore::new();
        let mut e = entry("email");
        let mut copy = e.clone();
        store.save(&mut e).await.unwrap();
        assert!(matches!(
            store.save(&mut copy).await,
            Err(StoreError::Conflict { expected: 0, .. })
        ));
    }

    #[tokio::test]
    async fn list_pending_skips_terminal_and_live_leases() {
        let store = MemoryOutboxStore::new();
        let now = Utc::now();

        let mut pending = entry("email");
        let mut failed = entry("email");
        failed.mark_failed("down");
        let mut done = entry("email");
        done.mark_success("msg-1");
        let mut abandoned = entry("email");
        abandoned.mark_abandoned();
        let mut leased = entry("email");
        leased.claim(now, std::time::Duration::from_secs(300)).unwrap();
        let mut expired = entry("email");
        expired
            .claim(now - chrono::Duration::seconds(600), std::time::Duration::from_secs(300))
            .unwrap();
        let mut unleased = entry("email");
        unleased.status = EntryStatus::Claimed;

        for e in [
            &mut pending,
            &mut failed,
            &mut done,
            &mut abandoned,
            &mut leased,
            &mut expired,
            &mut unleased,
        ] {
            store.save(e).await.unwrap();
        }

        let ids: Vec<Uuid> = store
            .list_pending(10, now)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![pending.id, failed.id, expired.id, unleased.id]);
    }

    #[tokio::test]
    async fn list_pending_honours_limit_in_creation_order() {
        let store = MemoryOutboxStore::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let mut e = entry("github_issue");
            store.save(&mut e).await.unwrap();
            ids.push(e.id);
        }

        let listed: Vec<Uuid> = store
            .list_pending(3, Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(listed, ids[..3]);
    }

    #[tokio::test]
    async fn counts_by_status() {
        let store = MemoryOutboxStore::new();
        let mut a = entry("email");
        let mut b = entry("email");
        let mut c = entry("email");
        c.mark_abandoned();
        for e in [&mut a, &mut b, &mut c] {
            store.save(e).await.unwrap();
        }

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(
            counts,
            vec![(EntryStatus::Pending, 2), (EntryStatus::Abandoned, 1)]
        );
    }
}
