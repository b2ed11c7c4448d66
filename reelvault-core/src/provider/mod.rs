//! Metadata provider boundary: the port the cache and sync workers consume,
//! plus the error taxonomy that drives retry classification.

use async_trait::async_trait;

use crate::catalog::{CachedEntity, FullRecord};
use crate::types::{EntityClass, ExternalId};

pub mod tvdb;

pub use tvdb::{TvdbProvider, TvdbSettings};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether a sync attempt that hit this error is worth retrying.
    /// Timeouts, connection failures, throttling, and server-side errors are
    /// transient; a confirmed missing id or a rejected key is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited => true,
            ProviderError::Upstream { status, .. } => *status >= 500,
            ProviderError::NotFound
            | ProviderError::InvalidApiKey
            | ProviderError::Parse(_) => false,
        }
    }
}

/// Read access to the external metadata provider.
///
/// `fetch_basic` returns the minimal record served on a cache miss;
/// `fetch_full` additionally resolves relational sub-resources (genres,
/// credits, aliases, and for series the seasons/episodes). Both distinguish
/// "not found" from transient failure, and both honor the client's request
/// timeout.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_basic(
        &self,
        class: EntityClass,
        id: ExternalId,
    ) -> Result<CachedEntity, ProviderError>;

    async fn fetch_full(
        &self,
        class: EntityClass,
        id: ExternalId,
    ) -> Result<FullRecord, ProviderError>;
}
