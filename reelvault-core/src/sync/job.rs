use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::types::EntityKey;

/// Unique identifier for sync jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two logical bands: `Interactive` work was triggered by a user-facing
/// cache miss or stale read; `Background` work comes from the scheduler's
/// sweep. Interactive is served first, bounded by the queue's fairness
/// window.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum JobPriority {
    Interactive = 0,
    Background = 1,
}

impl JobPriority {
    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            0 => Ok(JobPriority::Interactive),
            1 => Ok(JobPriority::Background),
            other => Err(CacheError::Internal(format!(
                "unknown job priority value {other}"
            ))),
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPriority::Interactive => write!(f, "interactive"),
            JobPriority::Background => write!(f, "background"),
        }
    }
}

/// A full-sync request for one entity identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: JobId,
    pub key: EntityKey,
    pub priority: JobPriority,
    /// 0-based; bumped on every re-enqueue after a transient failure.
    pub attempt: u16,
    pub enqueued_at: DateTime<Utc>,
    /// Backoff gate: the queue will not hand the job out before this.
    pub available_at: DateTime<Utc>,
}

impl SyncJob {
    pub fn new(key: EntityKey, priority: JobPriority) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            key,
            priority,
            attempt: 0,
            enqueued_at: now,
            available_at: now,
        }
    }

    /// The follow-up job for the next attempt, gated behind `delay`.
    pub fn next_attempt(&self, delay: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: self.id,
            key: self.key,
            priority: self.priority,
            attempt: self.attempt + 1,
            enqueued_at: self.enqueued_at,
            available_at: now + delay,
        }
    }
}
