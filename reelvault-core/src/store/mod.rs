//! Persistence boundary for cached entities and the sync log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::catalog::{CachedEntity, FullRecord};
use crate::error::Result;
use crate::staleness::TtlPolicy;
use crate::sync::log::SyncLogEntry;
use crate::types::EntityKey;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::InMemoryContentStore;
#[cfg(feature = "database")]
pub use postgres::PostgresContentStore;

/// Row-level persistence for the content cache.
///
/// Implementations must provide upsert semantics (re-running a sync for the
/// same id is idempotent) and must make `upsert_full` atomic from a reader's
/// point of view: no observer may see a `full` record whose sub-entities are
/// only partially written.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get(&self, key: EntityKey) -> Result<Option<CachedEntity>>;

    /// Insert or refresh a minimal record. Never downgrades an existing
    /// row's `sync_state` or `last_synced_at`.
    async fn upsert_basic(&self, entity: &CachedEntity) -> Result<()>;

    /// Persist a full record (root + all sub-entities) and flip the row to
    /// `full` with `last_synced_at = synced_at`, atomically.
    async fn upsert_full(
        &self,
        record: &FullRecord,
        synced_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Identities whose records are stale under `policy` as of `now`,
    /// oldest-synced first, bounded by `limit`.
    async fn find_stale(
        &self,
        policy: &TtlPolicy,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<EntityKey>>;

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Returns the number of entries removed.
    async fn delete_sync_logs_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64>;

    /// Most recent sync attempts, newest first. Read-only monitoring
    /// surface.
    async fn recent_sync_logs(&self, limit: i64) -> Result<Vec<SyncLogEntry>>;
}
