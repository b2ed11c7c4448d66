//! Periodic maintenance: the stale sweep and sync-log retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::staleness::TtlPolicy;
use crate::store::ContentStore;
use crate::sync::job::JobPriority;
use crate::sync::queue::SyncQueue;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    pub sweep_interval: Duration,
    /// Upper bound on identities enqueued per sweep pass.
    pub sweep_batch_limit: i64,
    pub retention_interval: Duration,
    pub log_retention: chrono::Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(6 * 60 * 60),
            sweep_batch_limit: 100,
            retention_interval: Duration::from_secs(24 * 60 * 60),
            log_retention: chrono::Duration::days(30),
        }
    }
}

/// Outcome of one sweep pass, for logs and tests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SweepReport {
    pub scanned: usize,
    pub enqueued: usize,
    pub skipped_in_flight: usize,
}

/// Runs the two maintenance duties on independent timers. Both duties are
/// idempotent, so overlapping runs (a slow sweep racing the next tick, or a
/// second process) are harmless: enqueue dedups, deletion by age predicate
/// repeats to zero rows.
pub struct MaintenanceScheduler {
    store: Arc<dyn ContentStore>,
    queue: SyncQueue,
    ttl: TtlPolicy,
    settings: SchedulerSettings,
    shutdown: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler")
            .field("settings", &self.settings)
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl MaintenanceScheduler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        queue: SyncQueue,
        ttl: TtlPolicy,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            queue,
            ttl,
            settings,
            shutdown: CancellationToken::new(),
            handles: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// One stale-sweep pass: find stale identities and queue background
    /// refreshes, leaning on the dedup gate to skip anything interactive
    /// traffic already has in flight.
    pub async fn run_stale_sweep_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let stale = self
            .store
            .find_stale(&self.ttl, now, self.settings.sweep_batch_limit)
            .await?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..SweepReport::default()
        };

        for key in stale {
            if self
                .queue
                .submit(key.class, key.id, JobPriority::Background)
                .await?
            {
                report.enqueued += 1;
            } else {
                report.skipped_in_flight += 1;
            }
        }

        info!(
            scanned = report.scanned,
            enqueued = report.enqueued,
            skipped = report.skipped_in_flight,
            "stale sweep completed"
        );
        Ok(report)
    }

    /// One retention pass. Failures here are storage hygiene problems, not
    /// correctness problems; callers log and move on.
    pub async fn run_log_retention_once(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.settings.log_retention;
        let deleted = self.store.delete_sync_logs_older_than(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "pruned old sync log entries");
        }
        Ok(deleted)
    }

    /// Spawn both periodic loops. The caller keeps its own handle for
    /// `shutdown`.
    pub async fn start(self: Arc<Self>) {
        let mut handles = self.handles.lock().await;

        let sweeper = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sweeper.shutdown.cancelled() => {
                        info!("stale sweep loop shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(sweeper.settings.sweep_interval) => {
                        if let Err(err) = sweeper.run_stale_sweep_once().await {
                            warn!(error = %err, "stale sweep failed");
                        }
                    }
                }
            }
        }));

        let pruner = Arc::clone(&self);
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pruner.shutdown.cancelled() => {
                        info!("log retention loop shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(pruner.settings.retention_interval) => {
                        if let Err(err) = pruner.run_log_retention_once().await {
                            warn!(error = %err, "log retention sweep failed");
                        }
                    }
                }
            }
        }));

        info!("maintenance scheduler started");
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles = {
            let mut guard = self.handles.lock().await;
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "scheduler task join failed");
            }
        }
    }
}
