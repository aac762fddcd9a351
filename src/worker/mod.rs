//! Cache workers
//!
//! A worker owns exactly one storage location for its lifetime: a local
//! filesystem directory ([`LocalWorker`]) or an object-storage prefix
//! ([`ObjectWorker`]). Several workers, in one process or many, may point at
//! the same location; the reference register decides when the last one out
//! turns off the lights.

pub mod local;
pub mod object;

pub use local::LocalWorker;
pub use object::ObjectWorker;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One worker's ownership claim on a storage location
///
/// Two workers pointing at the same physical path still carry distinct ids;
/// `base_path` is the shared coordinate, `id` is the claim.
#[derive(Debug, Clone, Serialize)]
pub struct CacheHandle {
    /// Identity of the owning worker, generated once per worker
    pub id: Uuid,

    /// Absolute directory path or storage URI prefix, ending in a separator
    pub base_path: String,

    /// Whether the cache is exempt from deletion
    pub locked: bool,

    /// Path supplied at attach time, if this handle did not allocate storage
    pub existing_cache: Option<String>,

    /// Set once, at first allocation only; attached handles carry `None`
    pub created_at: Option<DateTime<Utc>>,
}
