//! Object-storage cache worker
//!
//! The object-storage analogue of [`LocalWorker`](crate::worker::LocalWorker):
//! the unit of storage is a prefix instead of a directory and metadata is a
//! remote object instead of a file. There is no cross-process register for
//! this backend: the storage service is already the single shared source of
//! truth, so the locked flag plus caller discipline is the only deletion
//! guard. Storage is never deleted implicitly: releasing the handle leaves
//! every object in place, and [`ObjectWorker::delete`] is the one explicit
//! destruction path.

use crate::error::{CacheError, CacheResult};
use crate::storage::{split_storage_path, ObjectStore};
use crate::worker::CacheHandle;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Object key of the metadata document inside a cache prefix
const META_OBJECT: &str = "meta.json";

/// Worker owning one object-storage prefix
pub struct ObjectWorker {
    id: Uuid,
    base_dir: String,
    locked: bool,
    existing_cache: Option<String>,
    created_at: Option<DateTime<Utc>>,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ObjectWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWorker")
            .field("id", &self.id)
            .field("base_dir", &self.base_dir)
            .field("locked", &self.locked)
            .field("existing_cache", &self.existing_cache)
            .field("created_at", &self.created_at)
            .field("store", &"<store>")
            .finish()
    }
}

impl ObjectWorker {
    /// Allocate a fresh cache prefix, or attach to an existing one.
    ///
    /// A fresh cache gets an empty metadata object written eagerly so the
    /// prefix is observable immediately. Attaching derives the id from the
    /// trailing path segment of the supplied prefix and verifies the
    /// metadata object is present; no storage is written.
    pub async fn create(
        store: Arc<dyn ObjectStore>,
        cache_root: &str,
        existing_cache: Option<&str>,
    ) -> CacheResult<Self> {
        let root = normalize_prefix(cache_root);
        let (id, created_at) = match existing_cache {
            None => (Uuid::new_v4(), Some(Utc::now())),
            Some(existing) => (extract_id(existing)?, None),
        };

        let worker = Self {
            id,
            base_dir: format!("{}{}/", root, id),
            locked: false,
            existing_cache: existing_cache.map(str::to_string),
            created_at,
            store,
        };

        match existing_cache {
            None => {
                worker.write_meta(&Map::new()).await?;
                info!("created object cache {}", worker.base_dir);
            }
            Some(existing) => {
                if !worker.check_file(META_OBJECT).await? {
                    return Err(CacheError::ExistingCacheMissing(existing.to_string()));
                }
                debug!("attached to existing object cache {}", worker.base_dir);
            }
        }

        Ok(worker)
    }

    /// Worker identity
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Storage URI prefix, ending in '/'
    pub fn base_path(&self) -> &str {
        &self.base_dir
    }

    /// Whether the cache is flagged as exempt from deletion
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Flag the cache as exempt from deletion.
    ///
    /// Nothing in the storage service enforces this; callers must not
    /// trigger [`delete`](Self::delete) on a locked handle.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Externally visible view of this worker
    pub fn handle(&self) -> CacheHandle {
        CacheHandle {
            id: self.id,
            base_path: self.base_dir.clone(),
            locked: self.locked,
            existing_cache: self.existing_cache.clone(),
            created_at: self.created_at,
        }
    }

    /// Read the full metadata document
    pub async fn meta(&self) -> CacheResult<Map<String, Value>> {
        let (bucket, prefix) = split_storage_path(&self.base_dir);
        let body = self
            .store
            .get(&bucket, &format!("{}{}", prefix, META_OBJECT))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Write the full metadata document, replacing the previous one
    pub async fn write_meta(&self, meta: &Map<String, Value>) -> CacheResult<()> {
        let (bucket, prefix) = split_storage_path(&self.base_dir);
        let body = serde_json::to_vec(meta)?;
        self.store
            .put(&bucket, &format!("{}{}", prefix, META_OBJECT), body)
            .await
    }

    /// Set one metadata key, read-modify-writing the whole document.
    ///
    /// Last writer wins; there is no optimistic concurrency on the object.
    pub async fn insert_meta(&self, key: &str, value: Value) -> CacheResult<()> {
        let mut meta = self.meta().await?;
        meta.insert(key.to_string(), value);
        self.write_meta(&meta).await
    }

    /// Probe for a file's existence inside the cache prefix
    pub async fn check_file(&self, file: &str) -> CacheResult<bool> {
        let (bucket, prefix) = split_storage_path(&self.base_dir);
        self.store
            .exists(&bucket, &format!("{}{}", prefix, file))
            .await
    }

    /// Delete every object under the cache prefix
    pub async fn delete(&self) -> CacheResult<()> {
        let (bucket, prefix) = split_storage_path(&self.base_dir);
        self.store.delete_prefix(&bucket, &prefix).await?;
        info!("deleted object cache {}", self.base_dir);
        Ok(())
    }
}

fn normalize_prefix(root: &str) -> String {
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{}/", root)
    }
}

/// Extract the cache id from the trailing segment of a storage prefix
fn extract_id(storage_path: &str) -> CacheResult<Uuid> {
    let segment = storage_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    Uuid::parse_str(segment).map_err(|e| CacheError::ExistingCacheInvalid {
        path: storage_path.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    const ROOT: &str = "s3://test-bucket/caches/";

    #[tokio::test]
    async fn fresh_cache_writes_empty_meta() {
        let store = Arc::new(MemoryObjectStore::new());
        let worker = ObjectWorker::create(store.clone(), ROOT, None).await.unwrap();

        assert!(worker.base_path().starts_with(ROOT));
        assert!(worker.base_path().ends_with('/'));
        assert!(worker.check_file("meta.json").await.unwrap());
        assert!(worker.meta().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attach_derives_id_from_trailing_segment() {
        let store = Arc::new(MemoryObjectStore::new());
        let original = ObjectWorker::create(store.clone(), ROOT, None).await.unwrap();
        let prefix = original.base_path().to_string();

        let attached = ObjectWorker::create(store.clone(), ROOT, Some(&prefix))
            .await
            .unwrap();

        assert_eq!(attached.id(), original.id());
        assert_eq!(attached.base_path(), prefix);
        assert!(attached.created_at.is_none());
    }

    #[tokio::test]
    async fn attach_rejects_non_uuid_segment() {
        let store = Arc::new(MemoryObjectStore::new());

        let err = ObjectWorker::create(store, ROOT, Some("s3://test-bucket/caches/not-a-uuid/"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::ExistingCacheInvalid { .. }));
    }

    #[tokio::test]
    async fn attach_rejects_prefix_without_meta() {
        let store = Arc::new(MemoryObjectStore::new());
        let ghost = format!("{}{}/", ROOT, Uuid::new_v4());

        let err = ObjectWorker::create(store, ROOT, Some(&ghost)).await.unwrap_err();
        assert!(matches!(err, CacheError::ExistingCacheMissing(_)));
    }

    #[tokio::test]
    async fn insert_meta_preserves_other_keys() {
        let store = Arc::new(MemoryObjectStore::new());
        let worker = ObjectWorker::create(store, ROOT, None).await.unwrap();

        worker.insert_meta("x", serde_json::json!(1)).await.unwrap();
        worker.insert_meta("y", serde_json::json!("two")).await.unwrap();
        worker.insert_meta("x", serde_json::json!(1)).await.unwrap();

        let meta = worker.meta().await.unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["x"], serde_json::json!(1));
        assert_eq!(meta["y"], serde_json::json!("two"));
    }

    #[tokio::test]
    async fn delete_removes_every_object_under_prefix() {
        let store = Arc::new(MemoryObjectStore::new());
        let worker = ObjectWorker::create(store.clone(), ROOT, None).await.unwrap();

        let (bucket, prefix) = split_storage_path(worker.base_path());
        store
            .put(&bucket, &format!("{}artifact.bin", prefix), b"data".to_vec())
            .await
            .unwrap();

        assert!(worker.check_file("meta.json").await.unwrap());
        worker.delete().await.unwrap();
        assert!(!worker.check_file("meta.json").await.unwrap());
        assert!(!worker.check_file("artifact.bin").await.unwrap());
    }
}
