//! Cache manager façade
//!
//! The single entry point. A manager owns at most one active worker (local
//! or object-storage, mutually exclusive) and exposes a uniform surface for
//! creating, locking, wiping and annotating caches regardless of backend.

use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, CacheResult};
use crate::register::{CacheRegister, RedisRegister};
use crate::storage::{ObjectStore, S3ObjectStore};
use crate::worker::local::MetaDocument;
use crate::worker::{CacheHandle, LocalWorker, ObjectWorker};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The worker a manager currently holds, tagged by backend
pub enum ActiveWorker {
    Local(LocalWorker),
    Object(ObjectWorker),
}

/// Façade over the cache lifecycle
pub struct CacheManager {
    config: CacheConfig,
    register: Option<Arc<dyn CacheRegister>>,
    store: Option<Arc<dyn ObjectStore>>,
    worker: Option<ActiveWorker>,
}

impl CacheManager {
    /// Build a manager with real transports wired from the configuration:
    /// a redis register when an endpoint is configured, an S3 client when
    /// the object-storage backend is selected.
    pub async fn connect(config: CacheConfig) -> CacheResult<Self> {
        let register: Option<Arc<dyn CacheRegister>> = if config.register.is_configured() {
            Some(Arc::new(RedisRegister::connect(&config.register).await?))
        } else {
            None
        };

        let store: Option<Arc<dyn ObjectStore>> = match config.backend {
            BackendKind::ObjectStorage => Some(Arc::new(S3ObjectStore::from_env().await)),
            BackendKind::Local => None,
        };

        Ok(Self::with_parts(config, register, store))
    }

    /// Build a manager with explicitly injected register and store.
    ///
    /// This is how a shared in-process register
    /// ([`ProcessRegister`](crate::register::ProcessRegister)) or a test
    /// double is passed in.
    pub fn with_parts(
        config: CacheConfig,
        register: Option<Arc<dyn CacheRegister>>,
        store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        Self {
            config,
            register,
            store,
            worker: None,
        }
    }

    /// Release any held worker and create a new one per the configured
    /// backend.
    ///
    /// A fresh local cache gets an empty metadata document. Attaching to an
    /// existing local cache whose persisted metadata says `"locked": true`
    /// re-locks the new worker, so the durable lock state survives
    /// re-attachment.
    pub async fn create(&mut self, existing_cache: Option<&str>) -> CacheResult<()> {
        self.wipe().await?;

        match self.config.backend {
            BackendKind::Local => {
                let mut worker = LocalWorker::create(
                    &self.config.local_root(),
                    existing_cache,
                    self.register.clone(),
                )
                .await?;

                if existing_cache.is_none() {
                    worker.write_meta(&MetaDocument::new()).await?;
                } else {
                    let meta = worker.read_meta().await?;
                    if meta.get("locked").and_then(Value::as_bool).unwrap_or(false) {
                        worker.lock();
                        debug!("re-attached cache {} inherits locked state", worker.base_path());
                    }
                }

                self.worker = Some(ActiveWorker::Local(worker));
            }
            BackendKind::ObjectStorage => {
                let root = self.config.object_root()?;
                let store = self.store.clone().ok_or(CacheError::ObjectStoreMissing)?;
                let worker = ObjectWorker::create(store, &root, existing_cache).await?;
                self.worker = Some(ActiveWorker::Object(worker));
            }
        }

        Ok(())
    }

    /// Lock the active cache so release never deletes it, and persist the
    /// flag into metadata.
    pub async fn lock(&mut self) -> CacheResult<()> {
        match self.worker.as_mut() {
            None => Err(CacheError::NoActiveCache("locked")),
            Some(ActiveWorker::Local(worker)) => {
                worker.lock();
                worker.insert_meta("locked", Value::Bool(true)).await
            }
            Some(ActiveWorker::Object(worker)) => {
                worker.lock();
                worker.insert_meta("locked", Value::Bool(true)).await
            }
        }
    }

    /// Unlock the active cache so release deletes it again, and persist the
    /// flag into metadata.
    ///
    /// The object-storage backend has no unlock routine; asking for one is
    /// reported explicitly rather than silently ignored.
    pub async fn unlock(&mut self) -> CacheResult<()> {
        match self.worker.as_mut() {
            None => Err(CacheError::NoActiveCache("unlocked")),
            Some(ActiveWorker::Local(worker)) => {
                worker.unlock();
                worker.insert_meta("locked", Value::Bool(false)).await
            }
            Some(ActiveWorker::Object(_)) => Err(CacheError::Unsupported {
                operation: "unlock",
                backend: BackendKind::ObjectStorage,
            }),
        }
    }

    /// Set one metadata key on the active cache
    pub async fn insert_meta(&self, key: &str, value: impl Serialize) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        match self.worker.as_ref() {
            None => Err(CacheError::NoActiveCache("given metadata")),
            Some(ActiveWorker::Local(worker)) => worker.insert_meta(key, value).await,
            Some(ActiveWorker::Object(worker)) => worker.insert_meta(key, value).await,
        }
    }

    /// Read the full metadata document of the active cache
    pub async fn meta(&self) -> CacheResult<MetaDocument> {
        match self.worker.as_ref() {
            None => Err(CacheError::NoActiveCache("read for metadata")),
            Some(ActiveWorker::Local(worker)) => worker.read_meta().await,
            Some(ActiveWorker::Object(worker)) => worker.meta().await,
        }
    }

    /// Detach and release the current worker, if any.
    ///
    /// Whether storage survives is decided by the worker's release
    /// semantics: local directories are deleted when the last unlocked
    /// reference goes away; object prefixes always survive a wipe.
    pub async fn wipe(&mut self) -> CacheResult<()> {
        match self.worker.take() {
            None => Ok(()),
            Some(ActiveWorker::Local(worker)) => worker.release().await,
            Some(ActiveWorker::Object(worker)) => {
                debug!("detached object cache {}", worker.base_path());
                Ok(())
            }
        }
    }

    /// Explicitly destroy the active object cache's storage.
    ///
    /// Local caches are destroyed through release accounting, not through
    /// this call.
    pub async fn delete_storage(&self) -> CacheResult<()> {
        match self.worker.as_ref() {
            None => Err(CacheError::NoActiveCache("deleted")),
            Some(ActiveWorker::Local(_)) => Err(CacheError::Unsupported {
                operation: "delete_storage",
                backend: BackendKind::Local,
            }),
            Some(ActiveWorker::Object(worker)) => worker.delete().await,
        }
    }

    /// Path of the active cache, if one is held
    pub fn cache_path(&self) -> Option<String> {
        match self.worker.as_ref() {
            None => None,
            Some(ActiveWorker::Local(worker)) => Some(worker.base_path()),
            Some(ActiveWorker::Object(worker)) => Some(worker.base_path().to_string()),
        }
    }

    /// Handle of the active cache, if one is held
    pub fn handle(&self) -> Option<CacheHandle> {
        match self.worker.as_ref() {
            None => None,
            Some(ActiveWorker::Local(worker)) => Some(worker.handle()),
            Some(ActiveWorker::Object(worker)) => Some(worker.handle()),
        }
    }

    /// The active worker, if one is held
    pub fn worker(&self) -> Option<&ActiveWorker> {
        self.worker.as_ref()
    }

    /// The wired reference register, if any
    pub fn register(&self) -> Option<&Arc<dyn CacheRegister>> {
        self.register.as_ref()
    }

    /// Run `f` against a freshly created cache, then wipe unconditionally.
    ///
    /// The wipe runs on every exit path, including when `f` fails; an error
    /// from `f` takes precedence over an error from the wipe.
    pub async fn with_cache<T>(
        &mut self,
        existing_cache: Option<&str>,
        f: impl for<'a> FnOnce(&'a mut CacheManager) -> BoxFuture<'a, CacheResult<T>>,
    ) -> CacheResult<T> {
        self.create(existing_cache).await?;
        let result = f(self).await;
        let wiped = self.wipe().await;
        let value = result?;
        wiped?;
        Ok(value)
    }
}
