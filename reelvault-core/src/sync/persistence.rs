//! Durable Postgres-backed job queue.
//!
//! Jobs are rows: `ready` rows are handed out with `FOR UPDATE SKIP LOCKED`
//! and become `leased`; a consumer that dies without completing its lease is
//! resurrected by `reclaim_expired`, giving at-least-once delivery. A partial
//! unique index refuses a second active row for the same identity, so even
//! across processes duplicate enqueues collapse.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{EntityKey, ExternalId};

use super::job::{JobId, JobPriority, SyncJob};
use super::queue::{DEFAULT_INTERACTIVE_BURST, JobQueue, QueueDepth};

const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresJobQueue {
    pool: PgPool,
    lease_ttl_secs: i64,
    interactive_burst: u32,
    consecutive_interactive: AtomicU32,
}

impl fmt::Debug for PostgresJobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresJobQueue")
            .field("pool_size", &self.pool.size())
            .field("lease_ttl_secs", &self.lease_ttl_secs)
            .field("interactive_burst", &self.interactive_burst)
            .finish()
    }
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self::with_settings(pool, 60, DEFAULT_INTERACTIVE_BURST)
    }

    pub fn with_settings(
        pool: PgPool,
        lease_ttl_secs: i64,
        interactive_burst: u32,
    ) -> Self {
        Self {
            pool,
            lease_ttl_secs: lease_ttl_secs.max(1),
            interactive_burst: interactive_burst.max(1),
            consecutive_interactive: AtomicU32::new(0),
        }
    }

    /// Hand expired leases back out. Attempt counts are not bumped here: a
    /// crash is not a failed attempt, the job simply runs again.
    pub async fn reclaim_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET state = 'ready', lease_expires_at = NULL, \
             updated_at = NOW() \
             WHERE state = 'leased' AND lease_expires_at < NOW()",
        )
        .execute(&self.pool)
        .await?;

        let reclaimed = result.rows_affected();
        if reclaimed > 0 {
            info!(reclaimed, "resurrected expired job leases");
        }
        Ok(reclaimed)
    }

    async fn pull_priority(
        &self,
        priority: JobPriority,
    ) -> Result<Option<SyncJob>> {
        #[derive(sqlx::FromRow)]
        struct JobRow {
            id: uuid::Uuid,
            entity_class: String,
            external_id: i64,
            priority: i16,
            attempt: i32,
            enqueued_at: DateTime<Utc>,
            available_at: DateTime<Utc>,
        }

        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE sync_jobs SET state = 'leased', \
             lease_expires_at = NOW() + ($2 * INTERVAL '1 second'), \
             updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM sync_jobs \
                 WHERE state = 'ready' AND priority = $1 AND available_at <= NOW() \
                 ORDER BY available_at \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, entity_class, external_id, priority, attempt, \
                       enqueued_at, available_at",
        )
        .bind(priority as i16)
        .bind(self.lease_ttl_secs as f64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(SyncJob {
                id: JobId(row.id),
                key: EntityKey {
                    class: row.entity_class.parse()?,
                    id: ExternalId(row.external_id),
                },
                priority: JobPriority::from_i16(row.priority)?,
                attempt: row.attempt.max(0) as u16,
                enqueued_at: row.enqueued_at,
                available_at: row.available_at,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn push(&self, job: SyncJob) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO sync_jobs (id, entity_class, external_id, priority, \
             state, attempt, enqueued_at, available_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'ready', $5, $6, $7, NOW())",
        )
        .bind(job.id.0)
        .bind(job.key.class.as_str())
        .bind(job.key.id.as_i64())
        .bind(job.priority as i16)
        .bind(i32::from(job.attempt))
        .bind(job.enqueued_at)
        .bind(job.available_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                // Another process already has this identity active.
                debug!(key = %job.key, "duplicate active job, dropping enqueue");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn pull(&self) -> Result<Option<SyncJob>> {
        let prefer_background = self.consecutive_interactive.load(Ordering::Relaxed)
            >= self.interactive_burst;

        let order = if prefer_background {
            [JobPriority::Background, JobPriority::Interactive]
        } else {
            [JobPriority::Interactive, JobPriority::Background]
        };

        for priority in order {
            if let Some(job) = self.pull_priority(priority).await? {
                match priority {
                    JobPriority::Interactive => {
                        self.consecutive_interactive.fetch_add(1, Ordering::Relaxed);
                    }
                    JobPriority::Background => {
                        self.consecutive_interactive.store(0, Ordering::Relaxed);
                    }
                }
                return Ok(Some(job));
            }
            // Nothing waiting at the preferred band; the burst window resets
            // so an empty background queue cannot block interactive work.
            if priority == JobPriority::Background && prefer_background {
                self.consecutive_interactive.store(0, Ordering::Relaxed);
            }
        }

        Ok(None)
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        sqlx::query("DELETE FROM sync_jobs WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_terminal(&self, id: JobId, error: Option<String>) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET state = 'failed', lease_expires_at = NULL, \
             last_error = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.0)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue(&self, job: SyncJob) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET state = 'ready', attempt = $2, \
             available_at = $3, lease_expires_at = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job.id.0)
        .bind(i32::from(job.attempt))
        .bind(job.available_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let rows = sqlx::query_as::<_, (String, i16, i64)>(
            "SELECT state, priority, COUNT(*) FROM sync_jobs \
             WHERE state IN ('ready', 'leased') \
             GROUP BY state, priority",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut depth = QueueDepth::default();
        for (state, priority, count) in rows {
            let count = count.max(0) as usize;
            match (state.as_str(), JobPriority::from_i16(priority)?) {
                ("ready", JobPriority::Interactive) => {
                    depth.interactive_ready = count;
                }
                ("ready", JobPriority::Background) => {
                    depth.background_ready = count;
                }
                ("leased", _) => depth.leased += count,
                _ => {}
            }
        }
        Ok(depth)
    }
}
