//! Object-storage transport
//!
//! Provides a trait for the handful of object operations the cache needs so
//! that the concrete client stays replaceable: [`S3ObjectStore`] talks to a
//! real service, [`MemoryObjectStore`] keeps everything in memory for tests
//! and register-less development.

pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::error::CacheResult;
use async_trait::async_trait;

/// Abstract object-storage interface
///
/// Objects are addressed by `bucket`/`key` pairs. `exists` treats a
/// not-found condition as a normal `false`; any other failure propagates.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's contents
    async fn get(&self, bucket: &str, key: &str) -> CacheResult<Vec<u8>>;

    /// Write an object, replacing any existing contents
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> CacheResult<()>;

    /// Probe for an object's existence
    async fn exists(&self, bucket: &str, key: &str) -> CacheResult<bool>;

    /// List every key under a prefix
    async fn list(&self, bucket: &str, prefix: &str) -> CacheResult<Vec<String>>;

    /// Delete every object under a prefix
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> CacheResult<()>;
}

/// Split a storage URI into bucket and key prefix.
///
/// Strips an `s3://`-style scheme and splits on the first `/`:
/// `s3://bucket/caches/abc/` becomes `("bucket", "caches/abc/")`.
pub fn split_storage_path(storage_path: &str) -> (String, String) {
    let path = storage_path
        .strip_prefix("s3://")
        .unwrap_or(storage_path);
    match path.split_once('/') {
        Some((bucket, key)) => (bucket.to_string(), key.to_string()),
        None => (path.to_string(), String::new()),
    }
}
