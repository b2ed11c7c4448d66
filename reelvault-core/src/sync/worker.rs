//! Sync worker pool: consumes the job queue, pulls full records from the
//! provider, persists them, and applies the retry discipline.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{CacheError, Result};
use crate::provider::MetadataProvider;
use crate::store::ContentStore;
use crate::sync::job::SyncJob;
use crate::sync::log::SyncLogEntry;
use crate::sync::queue::{JobQueue, SyncQueue};
use crate::sync::retry::RetryPolicy;

/// Executes one sync job end-to-end. Shared by every worker in the pool;
/// holds no per-job state.
pub struct SyncWorker {
    queue: SyncQueue,
    provider: Arc<dyn MetadataProvider>,
    store: Arc<dyn ContentStore>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("retry", &self.retry)
            .finish()
    }
}

impl SyncWorker {
    pub fn new(
        queue: SyncQueue,
        provider: Arc<dyn MetadataProvider>,
        store: Arc<dyn ContentStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            provider,
            store,
            retry,
        }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Runs a job to a terminal or retrying outcome, including log writes,
    /// queue bookkeeping, and the in-flight marker.
    pub async fn process(&self, job: SyncJob) {
        let key = job.key;
        let started = std::time::Instant::now();

        match self.execute(&job).await {
            Ok(()) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                self.append_log(SyncLogEntry::success(key, job.attempt, duration_ms))
                    .await;
                if let Err(err) = self.queue.backend().complete(job.id).await {
                    warn!(%key, error = %err, "failed to mark queue job complete");
                }
                self.queue.gate().release(key);
                info!(%key, attempt = job.attempt, duration_ms, "full sync completed");
            }
            Err(err) => self.handle_failure(job, err).await,
        }
    }

    async fn execute(&self, job: &SyncJob) -> Result<()> {
        let mut record = self
            .provider
            .fetch_full(job.key.class, job.key.id)
            .await?;
        record.retain_aired_order();
        self.store.upsert_full(&record, Utc::now()).await
    }

    async fn handle_failure(&self, job: SyncJob, err: CacheError) {
        let key = job.key;
        let detail = err.to_string();

        if err.is_transient() && self.retry.should_retry(job.attempt) {
            self.append_log(SyncLogEntry::retrying(key, job.attempt, detail.as_str()))
                .await;

            let delay = self.retry.delay_for(job.id, job.attempt + 1);
            let next = job.next_attempt(delay);
            warn!(
                %key,
                attempt = job.attempt,
                delay_ms = delay.num_milliseconds(),
                error = %detail,
                "sync failed, retrying"
            );

            // The in-flight marker stays held across retries so duplicate
            // enqueues keep getting dropped.
            if let Err(requeue_err) = self.queue.backend().requeue(next).await {
                error!(
                    %key,
                    error = %requeue_err,
                    "failed to requeue sync job, releasing identity"
                );
                self.queue.gate().release(key);
            }
        } else {
            self.append_log(SyncLogEntry::failed(key, job.attempt, detail.as_str()))
                .await;
            if let Err(queue_err) = self
                .queue
                .backend()
                .fail_terminal(job.id, Some(detail.clone()))
                .await
            {
                warn!(%key, error = %queue_err, "failed to mark queue job failed");
            }
            self.queue.gate().release(key);
            warn!(
                %key,
                attempt = job.attempt,
                error = %detail,
                "sync failed terminally"
            );
        }
    }

    async fn append_log(&self, entry: SyncLogEntry) {
        if let Err(err) = self.store.append_sync_log(&entry).await {
            warn!(key = %entry.key, error = %err, "failed to append sync log entry");
        }
    }
}

/// Fixed-size pool of workers over the shared queue. Workers coordinate only
/// through the queue and the dedup gate; identities are disjoint by
/// construction.
pub struct SyncWorkerPool {
    worker: Arc<SyncWorker>,
    workers: usize,
    poll_interval: Duration,
    shutdown: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncWorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorkerPool")
            .field("workers", &self.workers)
            .field("poll_interval", &self.poll_interval)
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl SyncWorkerPool {
    pub fn new(worker: SyncWorker, workers: usize, poll_interval: Duration) -> Self {
        Self {
            worker: Arc::new(worker),
            workers: workers.max(1),
            poll_interval,
            shutdown: CancellationToken::new(),
            handles: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for index in 0..self.workers {
            let worker = Arc::clone(&self.worker);
            let shutdown = self.shutdown.clone();
            let poll_interval = self.poll_interval;

            handles.push(tokio::spawn(async move {
                loop {
                    if shutdown.is_cancelled() {
                        info!(worker = index, "sync worker shutting down");
                        break;
                    }

                    match worker.queue().backend().pull().await {
                        Ok(Some(job)) => worker.process(job).await,
                        Ok(None) => {
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                        Err(err) => {
                            error!(worker = index, error = %err, "queue pull failed");
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                _ = tokio::time::sleep(poll_interval * 2) => {}
                            }
                        }
                    }
                }
            }));
        }
        info!(workers = self.workers, "sync worker pool started");
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "sync worker task join failed");
            }
        }
        info!("sync worker pool stopped");
    }
}
