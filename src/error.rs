//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching engine.
///
/// Store and serialization failures are always returned through this type
/// rather than panicking across the public surface, so callers can fall back
/// to computing without the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failure communicating with the backing store
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-supplied retriever failed.
    ///
    /// Carried through unchanged: the engine has no opinion on retrieval
    /// errors and never treats one as a cache miss.
    #[error("retriever error: {0}")]
    Retrieval(#[source] anyhow::Error),

    /// Key is empty or exceeds the maximum length
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
