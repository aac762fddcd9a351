//! Local filesystem cache worker
//!
//! Owns one directory under `<root>/cache/<id>/` for the lifetime of the
//! worker. Fresh directories get a `timestamp.txt` allocation log; metadata
//! lives alongside the cached content in `meta.json`.
//!
//! Deletion is never tied to drop timing: callers release a worker
//! explicitly (directly or through the manager's scoped acquisition), and a
//! worker dropped without release leaves its storage intact and logs a
//! warning.

use crate::error::{CacheError, CacheResult};
use crate::register::CacheRegister;
use crate::worker::CacheHandle;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata document type: a flat key to JSON-value mapping
pub type MetaDocument = Map<String, Value>;

/// Worker owning one local cache directory
pub struct LocalWorker {
    id: Uuid,
    base_dir: PathBuf,
    locked: bool,
    existing_cache: Option<String>,
    created_at: Option<DateTime<Utc>>,
    register: Option<Arc<dyn CacheRegister>>,
    released: bool,
}

impl std::fmt::Debug for LocalWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWorker")
            .field("id", &self.id)
            .field("base_dir", &self.base_dir)
            .field("locked", &self.locked)
            .field("existing_cache", &self.existing_cache)
            .field("created_at", &self.created_at)
            .field("register", &self.register.as_ref().map(|_| "<register>"))
            .field("released", &self.released)
            .finish()
    }
}

impl LocalWorker {
    /// Allocate a fresh cache directory, or attach to an existing one.
    ///
    /// With `existing_cache` supplied the path must already exist as a
    /// directory and no storage is allocated. Otherwise a fresh directory
    /// `root/cache/<id>/` is created; a collision with the generated id is
    /// a fatal allocator failure, not retried.
    ///
    /// When a register is supplied the cache path is registered with it,
    /// incrementing the shared reference count.
    pub async fn create(
        root: &Path,
        existing_cache: Option<&str>,
        register: Option<Arc<dyn CacheRegister>>,
    ) -> CacheResult<Self> {
        let id = Uuid::new_v4();
        let mut worker = Self {
            id,
            base_dir: root.join("cache").join(id.to_string()),
            locked: false,
            existing_cache: existing_cache.map(str::to_string),
            created_at: None,
            register,
            released: false,
        };

        match existing_cache {
            Some(existing) => worker.attach_directory(existing).await?,
            None => worker.generate_directory().await?,
        }

        if let Some(register) = &worker.register {
            register.register(&worker.base_path()).await?;
        }

        Ok(worker)
    }

    /// Worker identity; distinct even across workers sharing a path
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cache directory as a path
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Cache directory rendered with a trailing separator.
    ///
    /// This string is the register key, so it must be identical for every
    /// worker attaching to the same directory.
    pub fn base_path(&self) -> String {
        let raw = self.base_dir.display().to_string();
        format!(
            "{}{}",
            raw.trim_end_matches(MAIN_SEPARATOR),
            MAIN_SEPARATOR
        )
    }

    /// Whether the cache is exempt from deletion
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Exempt the cache from deletion at release
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Clear the deletion exemption
    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Externally visible view of this worker
    pub fn handle(&self) -> CacheHandle {
        CacheHandle {
            id: self.id,
            base_path: self.base_path(),
            locked: self.locked,
            existing_cache: self.existing_cache.clone(),
            created_at: self.created_at,
        }
    }

    fn meta_path(&self) -> PathBuf {
        self.base_dir.join("meta.json")
    }

    /// Read the full metadata document.
    ///
    /// A cache with no `meta.json` (created out-of-band) reads as empty.
    pub async fn read_meta(&self) -> CacheResult<MetaDocument> {
        let path = self.meta_path();
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MetaDocument::new()),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading metadata {}", path.display()),
                    e,
                ))
            }
        };
        Ok(serde_json::from_slice(&content)?)
    }

    /// Write the full metadata document, replacing the previous one
    pub async fn write_meta(&self, meta: &MetaDocument) -> CacheResult<()> {
        let path = self.meta_path();
        let content = serde_json::to_vec(meta)?;
        fs::write(&path, content)
            .await
            .map_err(|e| CacheError::io(format!("writing metadata {}", path.display()), e))
    }

    /// Set one metadata key, read-modify-writing the whole document.
    ///
    /// Concurrent writers race on the document as a whole; the last writer
    /// wins.
    pub async fn insert_meta(&self, key: &str, value: Value) -> CacheResult<()> {
        let mut meta = self.read_meta().await?;
        meta.insert(key.to_string(), value);
        self.write_meta(&meta).await
    }

    /// Release this worker's claim on the directory.
    ///
    /// Without a register the directory is deleted immediately unless
    /// locked. With a register the path is deregistered first and the
    /// directory deleted only when this was the last reference and the
    /// cache is unlocked.
    pub async fn release(mut self) -> CacheResult<()> {
        self.released = true;

        match self.register.clone() {
            None => {
                if !self.locked {
                    self.delete_directory().await?;
                }
            }
            Some(register) => {
                let count = register.deregister(&self.base_path(), self.locked).await?;
                if count == 0 && !self.locked {
                    self.delete_directory().await?;
                }
            }
        }
        Ok(())
    }

    async fn attach_directory(&mut self, existing: &str) -> CacheResult<()> {
        let path = PathBuf::from(existing);
        let is_dir = fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(CacheError::ExistingCacheMissing(existing.to_string()));
        }

        self.base_dir = path;
        debug!("attached to existing cache {}", self.base_path());
        Ok(())
    }

    async fn generate_directory(&mut self) -> CacheResult<()> {
        if fs::metadata(&self.base_dir).await.is_ok() {
            return Err(CacheError::CacheCollision {
                path: self.base_dir.clone(),
            });
        }

        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            CacheError::io(
                format!("creating cache directory {}", self.base_dir.display()),
                e,
            )
        })?;

        let now = Utc::now();
        append_timestamp(&self.base_dir, now).await?;
        self.created_at = Some(now);
        info!("created cache directory {}", self.base_path());
        Ok(())
    }

    async fn delete_directory(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.base_dir).await {
            Ok(()) => {
                info!("deleted cache directory {}", self.base_path());
                Ok(())
            }
            // A racing co-owner may have deleted it first
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("cache directory {} already gone", self.base_path());
                Ok(())
            }
            Err(e) => Err(CacheError::io(
                format!("deleting cache directory {}", self.base_dir.display()),
                e,
            )),
        }
    }
}

impl Drop for LocalWorker {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "cache worker for {} dropped without release, storage left intact",
                self.base_path()
            );
        }
    }
}

/// Append one allocation timestamp to the cache's `timestamp.txt` log
pub async fn append_timestamp(cache_dir: &Path, timestamp: DateTime<Utc>) -> CacheResult<()> {
    let path = cache_dir.join("timestamp.txt");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .map_err(|e| CacheError::io(format!("opening timestamp log {}", path.display()), e))?;

    file.write_all(format!("{}\n", timestamp).as_bytes())
        .await
        .map_err(|e| CacheError::io(format!("appending to timestamp log {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| CacheError::io(format!("flushing timestamp log {}", path.display()), e))
}
