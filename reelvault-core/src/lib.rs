//! Content cache and background-sync coordinator for the Reelvault watch
//! tracker.
//!
//! The facade ([`cache::ContentCache`]) serves metadata reads database-first:
//! fresh records come straight from the store, stale or missing records are
//! answered with the best locally available data while a full refresh runs on
//! the worker pool ([`sync::SyncWorkerPool`]). The dedup gate keeps one sync
//! in flight per identity, the durable queue survives worker crashes, and the
//! scheduler ([`scheduler::MaintenanceScheduler`]) sweeps for stale records
//! and prunes the sync log.

pub mod cache;
pub mod catalog;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod staleness;
pub mod store;
pub mod sync;
pub mod types;

pub use cache::{ContentCache, Resolved, ServedFrom};
pub use error::{CacheError, Result};
pub use staleness::{TtlPolicy, is_stale};
pub use types::{EntityClass, EntityKey, ExternalId, SyncState};

/// Embedded schema migrations, applied by the daemon at startup.
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
