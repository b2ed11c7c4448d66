use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub freshness: FreshnessConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
}

/// Metadata provider credentials and transport tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Subscriber PIN, required by user-supported API keys.
    pub pin: Option<String>,
    /// Per-request timeout. Applies to every provider call, including the
    /// synchronous one on the cache-miss path.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api4.thetvdb.com/v4".to_string(),
            api_key: None,
            pin: None,
            timeout_secs: 10,
        }
    }
}

/// How long a synced record stays fresh, per entity class. Tunable without
/// redeploying: these feed the staleness evaluator directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub series_ttl_days: i64,
    pub movie_ttl_days: i64,
    /// People change rarely; default is double the content TTL.
    pub person_ttl_days: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            series_ttl_days: 7,
            movie_ttl_days: 7,
            person_ttl_days: 14,
        }
    }
}

/// Worker pool and retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub workers: usize,
    /// Retries after the initial attempt; a job runs at most
    /// `max_retries + 1` times.
    pub max_retries: u16,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive interactive jobs served before a waiting background job
    /// gets a turn.
    pub interactive_burst: u32,
    /// Idle worker sleep between queue polls.
    pub poll_interval_ms: u64,
    /// How long a pulled job may run before its lease is considered lost.
    pub lease_ttl_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 3,
            backoff_base_ms: 2_000,
            backoff_max_ms: 5 * 60 * 1_000,
            interactive_burst: 4,
            poll_interval_ms: 200,
            lease_ttl_secs: 120,
        }
    }
}

/// Periodic maintenance cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
    /// Stale identities enqueued per sweep pass.
    pub sweep_batch_limit: i64,
    pub retention_interval_secs: u64,
    pub log_retention_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 6 * 60 * 60,
            sweep_batch_limit: 100,
            retention_interval_secs: 24 * 60 * 60,
            log_retention_days: 30,
        }
    }
}
