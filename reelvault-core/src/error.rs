use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Store(err.to_string())
    }
}

impl CacheError {
    /// Whether a failed sync attempt carrying this error should be retried.
    ///
    /// Provider errors delegate to the provider's own status classification;
    /// store failures are assumed transient (connection loss, pool
    /// exhaustion) and retried; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Provider(err) => err.is_transient(),
            CacheError::Store(_) => true,
            CacheError::NotFound(_)
            | CacheError::Serialization(_)
            | CacheError::Internal(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
