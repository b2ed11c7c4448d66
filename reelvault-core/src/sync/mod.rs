//! Background sync machinery: jobs, the dedup gate, the work queue, the
//! retry policy, and the worker pool that drives full syncs.

pub mod dedup;
pub mod job;
pub mod log;
#[cfg(feature = "database")]
pub mod persistence;
pub mod queue;
pub mod retry;
pub mod worker;

pub use dedup::DedupGate;
pub use job::{JobId, JobPriority, SyncJob};
pub use log::{SyncLogEntry, SyncOutcome};
#[cfg(feature = "database")]
pub use persistence::PostgresJobQueue;
pub use queue::{InMemoryJobQueue, JobQueue, QueueDepth, SyncQueue};
pub use retry::RetryPolicy;
pub use worker::{SyncWorker, SyncWorkerPool};
