//! Error types for refcache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::BackendKind;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in refcache
#[derive(Error, Debug)]
pub enum CacheError {
    // Worker errors
    #[error("path '{0}' was supplied as an existing cache but does not exist")]
    ExistingCacheMissing(String),

    #[error("path '{path}' is not a valid cache prefix: {reason}")]
    ExistingCacheInvalid { path: String, reason: String },

    #[error("cache directory {path} already exists, allocator generated a colliding id")]
    CacheCollision { path: PathBuf },

    // Register errors
    #[error("cache {0} is not in the cache register so it cannot be deregistered")]
    NotRegistered(String),

    #[error("register entry for {path} is not an integer: {value}")]
    RegisterEntryInvalid { path: String, value: String },

    #[error("register transport error: {0}")]
    RegisterTransport(#[from] redis::RedisError),

    #[error("register endpoint is not configured")]
    RegisterEndpointMissing,

    // Manager errors
    #[error("no cache worker is active so it cannot be {0}")]
    NoActiveCache(&'static str),

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: BackendKind,
    },

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("object-storage backend selected but no cache root is configured")]
    ObjectRootMissing,

    #[error("object-storage backend selected but no object store is wired")]
    ObjectStoreMissing,

    // Object storage errors
    #[error("object storage error: {context}: {message}")]
    Storage { context: String, message: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an object storage error with context
    pub fn storage(context: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Storage {
            context: context.into(),
            message: source.to_string(),
        }
    }
}
