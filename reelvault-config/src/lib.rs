//! Shared configuration library for Reelvault.
//!
//! Centralizes config loading and validation so the sync daemon and any
//! future binaries share one source of truth for defaults and env variable
//! names.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoadError, load_from_env};
pub use models::{
    Config, DatabaseConfig, FreshnessConfig, ProviderConfig, SchedulerConfig,
    SyncConfig,
};
pub use validation::{ConfigWarning, validate};
