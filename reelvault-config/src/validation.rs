//! Load-time sanity checks. Warnings are advisory: the daemon logs them and
//! keeps going, matching how misconfiguration shows up in practice (degraded
//! behavior, not refusal to boot).

use std::fmt;

use url::Url;

use crate::models::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    MissingDatabaseUrl,
    MissingProviderKey,
    InvalidProviderBaseUrl(String),
    ZeroSyncWorkers,
    BackoffBaseAboveMax { base_ms: u64, max_ms: u64 },
    ZeroProviderTimeout,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL is not set; persistence is unavailable")
            }
            ConfigWarning::MissingProviderKey => {
                write!(f, "TVDB_API_KEY is not set; provider calls will fail")
            }
            ConfigWarning::InvalidProviderBaseUrl(url) => {
                write!(f, "provider base url {url:?} does not parse")
            }
            ConfigWarning::ZeroSyncWorkers => {
                write!(f, "SYNC_WORKERS is 0; queued syncs will never run")
            }
            ConfigWarning::BackoffBaseAboveMax { base_ms, max_ms } => {
                write!(
                    f,
                    "backoff base {base_ms}ms exceeds max {max_ms}ms; retries will all use the cap"
                )
            }
            ConfigWarning::ZeroProviderTimeout => {
                write!(f, "provider timeout is 0s; every call will time out")
            }
        }
    }
}

pub fn validate(config: &Config) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.database.url.is_none() {
        warnings.push(ConfigWarning::MissingDatabaseUrl);
    }
    if config.provider.api_key.is_none() {
        warnings.push(ConfigWarning::MissingProviderKey);
    }
    if Url::parse(&config.provider.base_url).is_err() {
        warnings.push(ConfigWarning::InvalidProviderBaseUrl(
            config.provider.base_url.clone(),
        ));
    }
    if config.sync.workers == 0 {
        warnings.push(ConfigWarning::ZeroSyncWorkers);
    }
    if config.sync.backoff_base_ms > config.sync.backoff_max_ms {
        warnings.push(ConfigWarning::BackoffBaseAboveMax {
            base_ms: config.sync.backoff_base_ms,
            max_ms: config.sync.backoff_max_ms,
        });
    }
    if config.provider.timeout_secs == 0 {
        warnings.push(ConfigWarning::ZeroProviderTimeout);
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_only_misses_credentials() {
        let warnings = validate(&Config::default());
        assert_eq!(
            warnings,
            vec![
                ConfigWarning::MissingDatabaseUrl,
                ConfigWarning::MissingProviderKey
            ]
        );
    }

    #[test]
    fn tuning_mistakes_are_flagged() {
        let mut config = Config::default();
        config.database.url = Some("postgres://localhost/reelvault".into());
        config.provider.api_key = Some("key".into());
        config.sync.workers = 0;
        config.sync.backoff_base_ms = 10_000;
        config.sync.backoff_max_ms = 1_000;
        config.provider.base_url = "not a url".into();

        let warnings = validate(&config);
        assert!(warnings.contains(&ConfigWarning::ZeroSyncWorkers));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::BackoffBaseAboveMax { .. }
        )));
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::InvalidProviderBaseUrl(_)
        )));
    }
}
