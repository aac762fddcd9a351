//! In-memory object store
//!
//! Backs the object-storage worker with a plain map. Used as a test double
//! and for development without a storage service.

use crate::error::{CacheError, CacheResult};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Object store holding all objects in process memory
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn object_key(bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored objects, across all buckets
    pub fn len(&self) -> usize {
        self.objects().len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> CacheResult<Vec<u8>> {
        self.objects()
            .get(&Self::object_key(bucket, key))
            .cloned()
            .ok_or_else(|| CacheError::storage("fetching object", format!("{}/{} not found", bucket, key)))
    }

    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> CacheResult<()> {
        self.objects().insert(Self::object_key(bucket, key), body);
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> CacheResult<bool> {
        Ok(self.objects().contains_key(&Self::object_key(bucket, key)))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> CacheResult<Vec<String>> {
        let full_prefix = Self::object_key(bucket, prefix);
        let mut keys: Vec<String> = self
            .objects()
            .keys()
            .filter(|k| k.starts_with(&full_prefix))
            .map(|k| k[bucket.len() + 1..].to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> CacheResult<()> {
        let full_prefix = Self::object_key(bucket, prefix);
        self.objects().retain(|k, _| !k.starts_with(&full_prefix));
        Ok(())
    }
}
