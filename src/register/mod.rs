//! Reference register for cross-process cache accounting
//!
//! The register is a shared counter table with one entry per cache path.
//! Every worker that attaches to a path increments its count; every release
//! decrements it. A cache directory may only be physically deleted when its
//! count reaches zero and it is not locked.
//!
//! Two implementations are provided: [`RedisRegister`] backed by a shared
//! network hash table (the canonical cross-process mechanism) and
//! [`ProcessRegister`], an in-memory fallback that only sees handles within
//! the current process.

pub mod process;
#[path = "redis.rs"]
pub mod redis_register;

pub use process::ProcessRegister;
pub use redis_register::RedisRegister;

use crate::error::CacheResult;
use async_trait::async_trait;
use std::collections::HashMap;

/// Shared counter table keyed by cache path
///
/// Counts are non-negative. Absence of an entry is equivalent to a count of
/// zero. Implementations must make `register` and `deregister` atomic per
/// key so that racing processes cannot overwrite each other's updates.
#[async_trait]
pub trait CacheRegister: Send + Sync {
    /// Current reference count for a cache path, or `None` if untracked
    async fn count(&self, cache_path: &str) -> CacheResult<Option<i64>>;

    /// Increment the count for a cache path, creating the entry at 1 if
    /// absent. Returns the new count.
    async fn register(&self, cache_path: &str) -> CacheResult<i64>;

    /// Decrement the count for a cache path, floored at zero.
    ///
    /// Fails with [`NotRegistered`](crate::CacheError::NotRegistered) if the
    /// path has never been registered. When the resulting count is zero and
    /// `locked` is false the entry is removed entirely; otherwise the count
    /// is persisted. Returns the post-decrement count.
    async fn deregister(&self, cache_path: &str, locked: bool) -> CacheResult<i64>;

    /// Diagnostic enumeration of every tracked path and its count
    async fn records(&self) -> CacheResult<HashMap<String, i64>>;
}
