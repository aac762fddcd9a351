//! Configuration for refcache
//!
//! Configuration is stored as TOML, by default at
//! `~/.config/refcache/config.toml`. Every field has a default so a missing
//! or partial file is always usable.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Storage backend a cache manager operates against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local filesystem directories
    #[default]
    Local,
    /// Object-storage prefixes (S3-style)
    ObjectStorage,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::ObjectStorage => write!(f, "object-storage"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which backend new caches are created against
    pub backend: BackendKind,

    /// Local filesystem settings
    pub local: LocalConfig,

    /// Reference register endpoint
    pub register: RegisterConfig,

    /// Object-storage settings
    #[serde(rename = "object-storage")]
    pub object_storage: ObjectStorageConfig,
}

/// Local filesystem backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Root directory fresh caches are allocated under.
    /// Defaults to the platform cache dir, falling back to the temp dir.
    pub root: Option<PathBuf>,
}

/// Reference register endpoint settings
///
/// When no host is configured the register is disabled and local caches are
/// deleted as soon as their worker is released.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    /// Register host, e.g. "localhost"
    pub host: Option<String>,

    /// Register port
    pub port: u16,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 6379,
        }
    }
}

impl RegisterConfig {
    /// Whether an endpoint is configured
    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }

    /// Connection URL for the configured endpoint
    pub fn url(&self) -> Option<String> {
        self.host
            .as_ref()
            .map(|host| format!("redis://{}:{}/", host, self.port))
    }
}

/// Object-storage backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// URI prefix all caches live under, e.g. "s3://bucket/caches/".
    /// Required when the object-storage backend is selected.
    pub cache_root: Option<String>,
}

impl CacheConfig {
    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("refcache")
            .join("config.toml")
    }

    /// Resolve the root directory fresh local caches are allocated under
    pub fn local_root(&self) -> PathBuf {
        self.local.root.clone().unwrap_or_else(default_cache_root)
    }

    /// Resolve the object-storage cache root, normalized to end in '/'
    pub fn object_root(&self) -> CacheResult<String> {
        let root = self
            .object_storage
            .cache_root
            .as_deref()
            .ok_or(CacheError::ObjectRootMissing)?;
        if root.ends_with('/') {
            Ok(root.to_string())
        } else {
            Ok(format!("{}/", root))
        }
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(path: &Path) -> CacheResult<Self> {
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Default root for fresh local caches
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("refcache")
}
