//! Append-only record of sync attempts, for diagnostics and the retention
//! sweep.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::types::EntityKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Success,
    Failed,
    Retrying,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::Failed => "failed",
            SyncOutcome::Retrying => "retrying",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOutcome {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(SyncOutcome::Success),
            "failed" => Ok(SyncOutcome::Failed),
            "retrying" => Ok(SyncOutcome::Retrying),
            other => Err(CacheError::Internal(format!(
                "unrecognized sync outcome {other:?}"
            ))),
        }
    }
}

/// One sync attempt's outcome. Immutable once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub key: EntityKey,
    pub attempt: u16,
    pub outcome: SyncOutcome,
    pub occurred_at: DateTime<Utc>,
    pub error_detail: Option<String>,
    pub duration_ms: Option<i64>,
}

impl SyncLogEntry {
    pub fn success(key: EntityKey, attempt: u16, duration_ms: i64) -> Self {
        Self {
            key,
            attempt,
            outcome: SyncOutcome::Success,
            occurred_at: Utc::now(),
            error_detail: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failed(key: EntityKey, attempt: u16, error: impl Into<String>) -> Self {
        Self {
            key,
            attempt,
            outcome: SyncOutcome::Failed,
            occurred_at: Utc::now(),
            error_detail: Some(error.into()),
            duration_ms: None,
        }
    }

    pub fn retrying(
        key: EntityKey,
        attempt: u16,
        error: impl Into<String>,
    ) -> Self {
        Self {
            key,
            attempt,
            outcome: SyncOutcome::Retrying,
            occurred_at: Utc::now(),
            error_detail: Some(error.into()),
            duration_ms: None,
        }
    }
}
