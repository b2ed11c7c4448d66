//! Content cache facade: the single entry point the API layer calls.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::CachedEntity;
use crate::error::{CacheError, Result};
use crate::provider::{MetadataProvider, ProviderError};
use crate::staleness::{TtlPolicy, is_stale};
use crate::store::ContentStore;
use crate::sync::job::JobPriority;
use crate::sync::queue::SyncQueue;
use crate::types::{EntityClass, EntityKey, ExternalId};

/// Where a resolved record came from. Telemetry only; callers must not
/// branch on this for correctness.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServedFrom {
    CacheFresh,
    CacheStale,
    FetchedNew,
}

#[derive(Clone, Debug)]
pub struct Resolved {
    pub record: CachedEntity,
    pub served_from: ServedFrom,
}

/// Read-through cache over the store and the metadata provider.
///
/// Freshness is decided per entity class; anything stale or missing is
/// served from the best locally available data while a full refresh runs in
/// the background. `resolve` never waits on a sync worker.
pub struct ContentCache {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn MetadataProvider>,
    queue: SyncQueue,
    ttl: TtlPolicy,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("ttl", &self.ttl)
            .field("queue", &self.queue)
            .finish()
    }
}

impl ContentCache {
    pub fn new(
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn MetadataProvider>,
        queue: SyncQueue,
        ttl: TtlPolicy,
    ) -> Self {
        Self {
            store,
            provider,
            queue,
            ttl,
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Resolve an entity by provider identity.
    ///
    /// Fresh cache hits return without touching the provider. Stale hits
    /// return the cached record immediately and queue a background refresh.
    /// Misses block only on the provider's *basic* payload; the full sync is
    /// queued, never awaited.
    pub async fn resolve(
        &self,
        class: EntityClass,
        id: ExternalId,
    ) -> Result<Resolved> {
        let key = EntityKey { class, id };

        if let Some(record) = self.store.get(key).await? {
            let now = Utc::now();
            if !is_stale(class, record.last_synced_at, now, &self.ttl) {
                debug!(%key, "cache hit, fresh");
                return Ok(Resolved {
                    record,
                    served_from: ServedFrom::CacheFresh,
                });
            }

            // Stale data beats a blocking network round trip; the refresh
            // happens behind the caller's back.
            let enqueued = self
                .queue
                .submit(class, id, JobPriority::Interactive)
                .await?;
            debug!(%key, enqueued, "cache hit, stale, refresh queued");
            return Ok(Resolved {
                record,
                served_from: ServedFrom::CacheStale,
            });
        }

        self.fetch_and_seed(key).await
    }

    /// Miss path: fetch the basic payload synchronously, seed the store,
    /// queue the full sync.
    async fn fetch_and_seed(&self, key: EntityKey) -> Result<Resolved> {
        let record = match self.provider.fetch_basic(key.class, key.id).await {
            Ok(record) => record,
            Err(ProviderError::NotFound) => {
                return Err(CacheError::NotFound(format!(
                    "provider has no {key}"
                )));
            }
            Err(err) => return Err(err.into()),
        };

        self.store.upsert_basic(&record).await?;

        let enqueued = self
            .queue
            .submit(key.class, key.id, JobPriority::Interactive)
            .await?;
        info!(%key, enqueued, "seeded basic record on cache miss");

        Ok(Resolved {
            record,
            served_from: ServedFrom::FetchedNew,
        })
    }
}
