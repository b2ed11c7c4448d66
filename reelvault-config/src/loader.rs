//! Env-driven configuration loading. Every knob has a default; only the
//! database URL and provider key genuinely need to be supplied.

use std::str::FromStr;

use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn var(name: &'static str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|err| {
            ConfigLoadError::InvalidValue {
                name,
                value: raw,
                reason: err.to_string(),
            }
        }),
    }
}

/// Build a [`Config`] from the process environment, starting from defaults.
///
/// Recognized variables:
/// `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`,
/// `TVDB_BASE_URL`, `TVDB_API_KEY`, `TVDB_PIN`, `PROVIDER_TIMEOUT_SECS`,
/// `SERIES_TTL_DAYS`, `MOVIE_TTL_DAYS`, `PERSON_TTL_DAYS`,
/// `SYNC_WORKERS`, `SYNC_MAX_RETRIES`, `SYNC_BACKOFF_BASE_MS`,
/// `SYNC_BACKOFF_MAX_MS`, `SYNC_INTERACTIVE_BURST`, `SYNC_POLL_INTERVAL_MS`,
/// `SYNC_LEASE_TTL_SECS`,
/// `SWEEP_INTERVAL_SECS`, `SWEEP_BATCH_LIMIT`,
/// `LOG_RETENTION_INTERVAL_SECS`, `LOG_RETENTION_DAYS`.
pub fn load_from_env() -> Result<Config, ConfigLoadError> {
    let mut config = Config::default();

    config.database.url = var("DATABASE_URL");
    if let Some(max) = parse_var::<u32>("DATABASE_MAX_CONNECTIONS")? {
        config.database.max_connections = Some(max);
    }

    if let Some(base_url) = var("TVDB_BASE_URL") {
        config.provider.base_url = base_url;
    }
    config.provider.api_key = var("TVDB_API_KEY");
    config.provider.pin = var("TVDB_PIN");
    if let Some(timeout) = parse_var::<u64>("PROVIDER_TIMEOUT_SECS")? {
        config.provider.timeout_secs = timeout;
    }

    if let Some(days) = parse_var::<i64>("SERIES_TTL_DAYS")? {
        config.freshness.series_ttl_days = days;
    }
    if let Some(days) = parse_var::<i64>("MOVIE_TTL_DAYS")? {
        config.freshness.movie_ttl_days = days;
    }
    if let Some(days) = parse_var::<i64>("PERSON_TTL_DAYS")? {
        config.freshness.person_ttl_days = days;
    }

    if let Some(workers) = parse_var::<usize>("SYNC_WORKERS")? {
        config.sync.workers = workers;
    }
    if let Some(retries) = parse_var::<u16>("SYNC_MAX_RETRIES")? {
        config.sync.max_retries = retries;
    }
    if let Some(base) = parse_var::<u64>("SYNC_BACKOFF_BASE_MS")? {
        config.sync.backoff_base_ms = base;
    }
    if let Some(max) = parse_var::<u64>("SYNC_BACKOFF_MAX_MS")? {
        config.sync.backoff_max_ms = max;
    }
    if let Some(burst) = parse_var::<u32>("SYNC_INTERACTIVE_BURST")? {
        config.sync.interactive_burst = burst;
    }
    if let Some(poll) = parse_var::<u64>("SYNC_POLL_INTERVAL_MS")? {
        config.sync.poll_interval_ms = poll;
    }
    if let Some(ttl) = parse_var::<i64>("SYNC_LEASE_TTL_SECS")? {
        config.sync.lease_ttl_secs = ttl;
    }

    if let Some(interval) = parse_var::<u64>("SWEEP_INTERVAL_SECS")? {
        config.scheduler.sweep_interval_secs = interval;
    }
    if let Some(limit) = parse_var::<i64>("SWEEP_BATCH_LIMIT")? {
        config.scheduler.sweep_batch_limit = limit;
    }
    if let Some(interval) = parse_var::<u64>("LOG_RETENTION_INTERVAL_SECS")? {
        config.scheduler.retention_interval_secs = interval;
    }
    if let Some(days) = parse_var::<i64>("LOG_RETENTION_DAYS")? {
        config.scheduler.log_retention_days = days;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hold_without_env() {
        // Scoped to variables no other test (or CI) is likely to set.
        let config = Config::default();
        assert_eq!(config.freshness.series_ttl_days, 7);
        assert_eq!(config.freshness.person_ttl_days, 14);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.scheduler.log_retention_days, 30);
    }

    // One test drives every env interaction: the loader reads the process
    // environment, and parallel tests mutating it would race each other.
    #[test]
    fn env_overrides_and_errors() {
        // SAFETY: test-process-local mutation, keys read back immediately.
        unsafe {
            std::env::set_var("PERSON_TTL_DAYS", "21");
            std::env::set_var("SYNC_MAX_RETRIES", "5");
            std::env::set_var("TVDB_API_KEY", "  key-with-padding  ");
        }

        let config = load_from_env().unwrap();
        assert_eq!(config.freshness.person_ttl_days, 21);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.provider.api_key.as_deref(), Some("key-with-padding"));

        unsafe {
            std::env::set_var("SWEEP_BATCH_LIMIT", "lots");
        }
        let err = load_from_env().unwrap_err();
        let ConfigLoadError::InvalidValue { name, value, .. } = err;
        assert_eq!(name, "SWEEP_BATCH_LIMIT");
        assert_eq!(value, "lots");

        unsafe {
            std::env::remove_var("PERSON_TTL_DAYS");
            std::env::remove_var("SYNC_MAX_RETRIES");
            std::env::remove_var("TVDB_API_KEY");
            std::env::remove_var("SWEEP_BATCH_LIMIT");
        }
    }
}
