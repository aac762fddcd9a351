//! refcache - ephemeral, reference-counted cache directories
//!
//! A process requests a cache (a local directory or an object-storage
//! prefix), writes artifacts and a small metadata record into it, and
//! relinquishes it when done. Multiple processes may attach to the same
//! cache; its storage is destroyed exactly when the last referencing worker
//! releases it, unless the cache is locked.

pub mod config;
pub mod error;
pub mod manager;
pub mod register;
pub mod storage;
pub mod worker;

pub use config::{BackendKind, CacheConfig};
pub use error::{CacheError, CacheResult};
pub use manager::{ActiveWorker, CacheManager};
pub use register::{CacheRegister, ProcessRegister, RedisRegister};
pub use storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use worker::{CacheHandle, LocalWorker, ObjectWorker};
