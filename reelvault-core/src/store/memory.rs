//! In-memory store used by tests and single-node development. Mirrors the
//! Postgres implementation's contract; `upsert_full` swaps the whole record
//! under one lock so readers never see a partially synced entity.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::catalog::{CachedEntity, FullRecord};
use crate::error::Result;
use crate::staleness::{TtlPolicy, is_stale};
use crate::sync::log::SyncLogEntry;
use crate::types::{EntityKey, SyncState};

use super::ContentStore;

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    entities: Mutex<HashMap<EntityKey, FullRecord>>,
    sync_log: Mutex<Vec<SyncLogEntry>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: full record including sub-entities.
    pub async fn full_record(&self, key: EntityKey) -> Option<FullRecord> {
        self.entities.lock().await.get(&key).cloned()
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.lock().await.len()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, key: EntityKey) -> Result<Option<CachedEntity>> {
        let guard = self.entities.lock().await;
        Ok(guard.get(&key).map(|record| record.entity.clone()))
    }

    async fn upsert_basic(&self, entity: &CachedEntity) -> Result<()> {
        let mut guard = self.entities.lock().await;
        match guard.get_mut(&entity.key) {
            Some(existing) => {
                let sync_state = existing.entity.sync_state;
                let last_synced_at = existing.entity.last_synced_at;
                existing.entity = entity.clone();
                // A racing miss-path write must not downgrade a synced row.
                existing.entity.sync_state = sync_state;
                existing.entity.last_synced_at = last_synced_at;
            }
            None => {
                let mut record = FullRecord::new(entity.clone());
                record.entity.sync_state = SyncState::Basic;
                record.entity.last_synced_at = None;
                guard.insert(entity.key, record);
            }
        }
        Ok(())
    }

    async fn upsert_full(
        &self,
        record: &FullRecord,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut stored = record.clone();
        stored.entity.sync_state = SyncState::Full;
        stored.entity.last_synced_at = Some(synced_at);

        let mut guard = self.entities.lock().await;
        guard.insert(stored.key(), stored);
        Ok(())
    }

    async fn find_stale(
        &self,
        policy: &TtlPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EntityKey>> {
        let guard = self.entities.lock().await;
        let mut stale: Vec<&FullRecord> = guard
            .values()
            .filter(|record| {
                is_stale(
                    record.key().class,
                    record.entity.last_synced_at,
                    now,
                    policy,
                )
            })
            .collect();
        stale.sort_by_key(|record| record.entity.last_synced_at);

        Ok(stale
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|record| record.key())
            .collect())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        self.sync_log.lock().await.push(entry.clone());
        Ok(())
    }

    async fn delete_sync_logs_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut guard = self.sync_log.lock().await;
        let before = guard.len();
        guard.retain(|entry| entry.occurred_at >= cutoff);
        Ok((before - guard.len()) as u64)
    }

    async fn recent_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>> {
        let guard = self.sync_log.lock().await;
        let mut entries: Vec<SyncLogEntry> = guard.clone();
        entries.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GenreRecord;
    use crate::sync::log::{SyncLogEntry, SyncOutcome};
    use crate::types::EntityClass;
    use chrono::Duration;

    fn key(id: i64) -> EntityKey {
        EntityKey::new(EntityClass::Series, id)
    }

    #[tokio::test]
    async fn upsert_basic_does_not_downgrade_full_rows() {
        let store = InMemoryContentStore::new();
        let synced_at = Utc::now();

        let mut record =
            FullRecord::new(CachedEntity::basic(key(1), "Severance"));
        record.genres.push(GenreRecord::new(Some(5), "Drama"));
        store.upsert_full(&record, synced_at).await.unwrap();

        let refreshed = CachedEntity::basic(key(1), "Severance (refreshed)");
        store.upsert_basic(&refreshed).await.unwrap();

        let entity = store.get(key(1)).await.unwrap().unwrap();
        assert_eq!(entity.name, "Severance (refreshed)");
        assert_eq!(entity.sync_state, SyncState::Full);
        assert_eq!(entity.last_synced_at, Some(synced_at));
        // Sub-entities survive the basic refresh.
        assert_eq!(store.full_record(key(1)).await.unwrap().genres.len(), 1);
    }

    #[tokio::test]
    async fn find_stale_orders_oldest_first_and_respects_limit() {
        let store = InMemoryContentStore::new();
        let policy = TtlPolicy::default();
        let now = Utc::now();

        for (id, age_days) in [(1, 30), (2, 10), (3, 1)] {
            let record =
                FullRecord::new(CachedEntity::basic(key(id), format!("s{id}")));
            store
                .upsert_full(&record, now - Duration::days(age_days))
                .await
                .unwrap();
        }

        let stale = store.find_stale(&policy, now, 10).await.unwrap();
        assert_eq!(
            stale,
            vec![key(1), key(2)],
            "only the two past-TTL records, oldest first"
        );

        let limited = store.find_stale(&policy, now, 1).await.unwrap();
        assert_eq!(limited, vec![key(1)]);
    }

    #[tokio::test]
    async fn log_retention_deletes_only_old_entries() {
        let store = InMemoryContentStore::new();
        let now = Utc::now();

        for age_days in [40, 20, 1] {
            store
                .append_sync_log(&SyncLogEntry {
                    key: key(9),
                    attempt: 0,
                    outcome: SyncOutcome::Success,
                    occurred_at: now - Duration::days(age_days),
                    error_detail: None,
                    duration_ms: Some(12),
                })
                .await
                .unwrap();
        }

        let deleted = store
            .delete_sync_logs_older_than(now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.recent_sync_logs(10).await.unwrap().len(), 2);
    }
}
