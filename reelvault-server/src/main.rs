//! Reelvault sync daemon: runs the worker pool, the lease housekeeper, and
//! the maintenance scheduler against Postgres. The HTTP layer lives
//! elsewhere and talks to the same database.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelvault_core::provider::{TvdbProvider, TvdbSettings};
use reelvault_core::scheduler::{MaintenanceScheduler, SchedulerSettings};
use reelvault_core::staleness::TtlPolicy;
use reelvault_core::store::PostgresContentStore;
use reelvault_core::sync::{
    DedupGate, PostgresJobQueue, RetryPolicy, SyncQueue, SyncWorker,
    SyncWorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = reelvault_config::load_from_env()
        .context("failed to load configuration")?;
    for warning in reelvault_config::validate(&config) {
        warn!(%warning, "configuration warning");
    }

    let database_url = config
        .database
        .url
        .clone()
        .context("DATABASE_URL must be set")?;
    let api_key = config
        .provider
        .api_key
        .clone()
        .context("TVDB_API_KEY must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections.unwrap_or(10))
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    reelvault_core::MIGRATOR
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("connected to Postgres, schema up to date");

    let provider = Arc::new(TvdbProvider::new(TvdbSettings {
        base_url: config.provider.base_url.clone(),
        api_key,
        pin: config.provider.pin.clone(),
        timeout: Duration::from_secs(config.provider.timeout_secs),
    })?);
    let store = Arc::new(PostgresContentStore::new(pool.clone()));
    let queue_backend = Arc::new(PostgresJobQueue::with_settings(
        pool.clone(),
        config.sync.lease_ttl_secs,
        config.sync.interactive_burst,
    ));
    let queue = SyncQueue::new(DedupGate::new(), queue_backend.clone());

    let ttl = TtlPolicy::from_days(
        config.freshness.series_ttl_days,
        config.freshness.movie_ttl_days,
        config.freshness.person_ttl_days,
    );
    let retry = RetryPolicy {
        max_retries: config.sync.max_retries,
        backoff_base_ms: config.sync.backoff_base_ms,
        backoff_max_ms: config.sync.backoff_max_ms,
        ..RetryPolicy::default()
    };

    let pool_workers = SyncWorkerPool::new(
        SyncWorker::new(queue.clone(), provider, store.clone(), retry),
        config.sync.workers,
        Duration::from_millis(config.sync.poll_interval_ms),
    );
    pool_workers.start().await;

    // Lease housekeeping: resurrect jobs whose worker died mid-run.
    {
        let queue_backend = queue_backend.clone();
        let interval =
            Duration::from_secs((config.sync.lease_ttl_secs as u64 / 2).max(5));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = queue_backend.reclaim_expired().await {
                    warn!(error = %err, "lease reclaim failed");
                }
            }
        });
    }

    let scheduler = Arc::new(MaintenanceScheduler::new(
        store,
        queue,
        ttl,
        SchedulerSettings {
            sweep_interval: Duration::from_secs(
                config.scheduler.sweep_interval_secs,
            ),
            sweep_batch_limit: config.scheduler.sweep_batch_limit,
            retention_interval: Duration::from_secs(
                config.scheduler.retention_interval_secs,
            ),
            log_retention: chrono::Duration::days(
                config.scheduler.log_retention_days,
            ),
        },
    ));
    scheduler.clone().start().await;

    info!("reelvault sync daemon running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    scheduler.shutdown().await;
    pool_workers.shutdown().await;
    Ok(())
}
