//! In-process reference register
//!
//! A process-wide registry for callers that share cache directories between
//! multiple workers in the same process without a shared register service.
//! It is constructed explicitly (typically once at process start), shared by
//! `Arc`, and passed to every manager that should see the same counts. It
//! cannot see references held by other processes.

use crate::error::{CacheError, CacheResult};
use crate::register::CacheRegister;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// In-memory counter table, shared within one process
#[derive(Debug, Default)]
pub struct ProcessRegister {
    entries: Mutex<HashMap<String, i64>>,
}

impl ProcessRegister {
    /// Create an empty register
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheRegister for ProcessRegister {
    async fn count(&self, cache_path: &str) -> CacheResult<Option<i64>> {
        Ok(self.entries().get(cache_path).copied())
    }

    async fn register(&self, cache_path: &str) -> CacheResult<i64> {
        let mut entries = self.entries();
        let count = entries.entry(cache_path.to_string()).or_insert(0);
        *count += 1;
        debug!("registered cache {} (count {})", cache_path, count);
        Ok(*count)
    }

    async fn deregister(&self, cache_path: &str, locked: bool) -> CacheResult<i64> {
        let mut entries = self.entries();
        let Some(count) = entries.get_mut(cache_path) else {
            return Err(CacheError::NotRegistered(cache_path.to_string()));
        };

        if *count > 0 {
            *count -= 1;
        }
        let count = *count;

        if count <= 0 && !locked {
            entries.remove(cache_path);
        }
        debug!("deregistered cache {} (count {})", cache_path, count);
        Ok(count)
    }

    async fn records(&self) -> CacheResult<HashMap<String, i64>> {
        Ok(self.entries().clone())
    }
}
