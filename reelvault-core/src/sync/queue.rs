//! Work queue carrying sync jobs, and the dedup-gated enqueue front.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::types::{EntityClass, EntityKey, ExternalId};

use super::dedup::DedupGate;
use super::job::{JobId, JobPriority, SyncJob};

/// Ready/leased counters for the monitoring surface.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct QueueDepth {
    pub interactive_ready: usize,
    pub background_ready: usize,
    pub leased: usize,
}

impl QueueDepth {
    pub fn ready(&self) -> usize {
        self.interactive_ready + self.background_ready
    }
}

/// Queue backend consumed by the worker pool.
///
/// Delivery is at-least-once: a pulled job stays leased until `complete` or
/// `fail_terminal`, and a crashed consumer's lease is eventually handed out
/// again. Jobs gated by `available_at` are not handed out early.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn push(&self, job: SyncJob) -> Result<()>;

    /// Next runnable job, interactive first within the fairness window.
    async fn pull(&self) -> Result<Option<SyncJob>>;

    async fn complete(&self, id: JobId) -> Result<()>;

    async fn fail_terminal(&self, id: JobId, error: Option<String>) -> Result<()>;

    /// Put a leased job back as ready for its next attempt (the caller has
    /// already bumped `attempt` and set `available_at`).
    async fn requeue(&self, job: SyncJob) -> Result<()>;

    async fn depth(&self) -> Result<QueueDepth>;
}

/// Number of consecutive interactive pulls allowed while background work is
/// waiting.
pub const DEFAULT_INTERACTIVE_BURST: u32 = 4;

#[derive(Debug, Default)]
struct QueueInner {
    ready: Vec<SyncJob>,
    leased: HashMap<JobId, SyncJob>,
    consecutive_interactive: u32,
}

/// Process-local queue for tests and single-node development. The Postgres
/// queue provides the durable variant with the same semantics.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    inner: Mutex<QueueInner>,
    interactive_burst: u32,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(DEFAULT_INTERACTIVE_BURST)
    }
}

impl InMemoryJobQueue {
    pub fn new(interactive_burst: u32) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            interactive_burst: interactive_burst.max(1),
        }
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn push(&self, job: SyncJob) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.ready.push(job);
        Ok(())
    }

    async fn pull(&self) -> Result<Option<SyncJob>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        let runnable = |job: &SyncJob, priority: JobPriority| {
            job.priority == priority && job.available_at <= now
        };

        let background_waiting = inner
            .ready
            .iter()
            .any(|job| runnable(job, JobPriority::Background));
        let prefer_background = background_waiting
            && inner.consecutive_interactive >= self.interactive_burst;

        let order = if prefer_background {
            [JobPriority::Background, JobPriority::Interactive]
        } else {
            [JobPriority::Interactive, JobPriority::Background]
        };

        for priority in order {
            if let Some(pos) =
                inner.ready.iter().position(|job| runnable(job, priority))
            {
                let job = inner.ready.remove(pos);
                inner.consecutive_interactive = match priority {
                    JobPriority::Interactive => {
                        inner.consecutive_interactive + 1
                    }
                    JobPriority::Background => 0,
                };
                inner.leased.insert(job.id, job.clone());
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    async fn complete(&self, id: JobId) -> Result<()> {
        self.inner.lock().await.leased.remove(&id);
        Ok(())
    }

    async fn fail_terminal(&self, id: JobId, _error: Option<String>) -> Result<()> {
        self.inner.lock().await.leased.remove(&id);
        Ok(())
    }

    async fn requeue(&self, job: SyncJob) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.leased.remove(&job.id);
        inner.ready.push(job);
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let inner = self.inner.lock().await;
        Ok(QueueDepth {
            interactive_ready: inner
                .ready
                .iter()
                .filter(|job| job.priority == JobPriority::Interactive)
                .count(),
            background_ready: inner
                .ready
                .iter()
                .filter(|job| job.priority == JobPriority::Background)
                .count(),
            leased: inner.leased.len(),
        })
    }
}

/// Dedup-gated enqueue front shared by the facade and the scheduler. At most
/// one in-flight job per identity; duplicates are dropped, not queued.
#[derive(Clone)]
pub struct SyncQueue {
    gate: DedupGate,
    backend: Arc<dyn JobQueue>,
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("in_flight", &self.gate.len())
            .finish()
    }
}

impl SyncQueue {
    pub fn new(gate: DedupGate, backend: Arc<dyn JobQueue>) -> Self {
        Self { gate, backend }
    }

    pub fn gate(&self) -> &DedupGate {
        &self.gate
    }

    pub fn backend(&self) -> &Arc<dyn JobQueue> {
        &self.backend
    }

    /// Queues a full sync for the identity unless one is already in flight.
    /// Returns whether a job was actually enqueued.
    pub async fn submit(
        &self,
        class: EntityClass,
        id: ExternalId,
        priority: JobPriority,
    ) -> Result<bool> {
        let key = EntityKey { class, id };
        if !self.gate.try_acquire(key) {
            debug!(%key, "sync already in flight, dropping enqueue");
            return Ok(false);
        }

        let job = SyncJob::new(key, priority);
        if let Err(err) = self.backend.push(job).await {
            // The job never made it into the queue; free the identity so a
            // later request can try again.
            self.gate.release(key);
            return Err(err);
        }

        debug!(%key, %priority, "sync job enqueued");
        Ok(true)
    }

    pub async fn depth(&self) -> Result<QueueDepth> {
        self.backend.depth().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(id: i64) -> EntityKey {
        EntityKey::new(EntityClass::Series, id)
    }

    #[tokio::test]
    async fn pull_honors_available_at() {
        let queue = InMemoryJobQueue::default();
        let mut job = SyncJob::new(key(1), JobPriority::Interactive);
        job.available_at = Utc::now() + Duration::seconds(60);
        queue.push(job).await.unwrap();

        assert!(queue.pull().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap().interactive_ready, 1);
    }

    #[tokio::test]
    async fn interactive_burst_does_not_starve_background() {
        let queue = InMemoryJobQueue::new(2);
        for id in 0..5 {
            queue
                .push(SyncJob::new(key(id), JobPriority::Interactive))
                .await
                .unwrap();
        }
        queue
            .push(SyncJob::new(key(100), JobPriority::Background))
            .await
            .unwrap();

        let mut order = Vec::new();
        while let Some(job) = queue.pull().await.unwrap() {
            order.push(job.priority);
            queue.complete(job.id).await.unwrap();
        }

        assert_eq!(order.len(), 6);
        let background_pos = order
            .iter()
            .position(|p| *p == JobPriority::Background)
            .unwrap();
        assert_eq!(
            background_pos, 2,
            "background job taken after the burst window, not last"
        );
    }

    #[tokio::test]
    async fn interactive_wins_when_no_background_pressure() {
        let queue = InMemoryJobQueue::new(2);
        queue
            .push(SyncJob::new(key(1), JobPriority::Background))
            .await
            .unwrap();
        queue
            .push(SyncJob::new(key(2), JobPriority::Interactive))
            .await
            .unwrap();

        let first = queue.pull().await.unwrap().unwrap();
        assert_eq!(first.priority, JobPriority::Interactive);
    }

    #[tokio::test]
    async fn submit_drops_duplicates_while_in_flight() {
        let sync_queue = SyncQueue::new(
            DedupGate::new(),
            Arc::new(InMemoryJobQueue::default()),
        );

        assert!(
            sync_queue
                .submit(EntityClass::Series, ExternalId(81189), JobPriority::Interactive)
                .await
                .unwrap()
        );
        assert!(
            !sync_queue
                .submit(EntityClass::Series, ExternalId(81189), JobPriority::Background)
                .await
                .unwrap()
        );
        assert_eq!(sync_queue.depth().await.unwrap().ready(), 1);

        // Pulling leases the job; the identity stays in flight until a
        // terminal outcome, so submits still drop.
        let job = sync_queue.backend().pull().await.unwrap().unwrap();
        assert!(
            !sync_queue
                .submit(EntityClass::Series, ExternalId(81189), JobPriority::Interactive)
                .await
                .unwrap()
        );

        sync_queue.backend().complete(job.id).await.unwrap();
        sync_queue.gate().release(job.key);
        assert!(
            sync_queue
                .submit(EntityClass::Series, ExternalId(81189), JobPriority::Interactive)
                .await
                .unwrap()
        );
    }
}
