//! Cache error types

use thiserror::Error;
use viewcache_core::{CoreError, ListenerError};

/// Master error type for cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// A listener failed under `ListenerFailurePolicy::FailFast`.
    ///
    /// The write that triggered the notification has already been applied.
    #[error("Listener for fields [{fields}] failed: {source}")]
    Listener {
        fields: String,
        #[source]
        source: ListenerError,
    },
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
