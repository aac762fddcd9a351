//! Redis-backed reference register
//!
//! Counts live in a single fixed hash table keyed by cache path, with
//! string-encoded integer values, so that unrelated processes sharing a
//! cache root agree on when it is safe to delete a directory.
//!
//! Both mutations are atomic on the server side: `register` is a plain
//! `HINCRBY`, and `deregister` runs a small Lua script that decrements,
//! floors at zero and removes the entry in one step. A get-then-set
//! sequence here would let two racing processes read the same count and
//! silently overwrite each other.

use crate::config::RegisterConfig;
use crate::error::{CacheError, CacheResult};
use crate::register::CacheRegister;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use tracing::debug;

/// Hash table holding every register entry
const TABLE: &str = "CACHE_REGISTER";

/// Decrement floored at zero; entry removed when it hits zero unlocked.
/// Returns -1 when the path was never registered.
const DEREGISTER_SCRIPT: &str = r#"
local count = redis.call('HGET', KEYS[1], ARGV[1])
if not count then
  return -1
end
count = tonumber(count)
if count > 0 then
  count = count - 1
end
if count <= 0 and ARGV[2] == '0' then
  redis.call('HDEL', KEYS[1], ARGV[1])
else
  redis.call('HSET', KEYS[1], ARGV[1], tostring(count))
end
return count
"#;

/// Reference register backed by a shared network hash table
pub struct RedisRegister {
    connection: MultiplexedConnection,
}

impl RedisRegister {
    /// Connect to the endpoint described by the register configuration
    pub async fn connect(config: &RegisterConfig) -> CacheResult<Self> {
        let url = config.url().ok_or(CacheError::RegisterEndpointMissing)?;
        let client = redis::Client::open(url.as_str())?;
        let connection = client.get_multiplexed_async_connection().await?;
        debug!("connected to cache register at {}", url);
        Ok(Self { connection })
    }

    /// Wrap an already-established connection
    pub fn with_connection(connection: MultiplexedConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl CacheRegister for RedisRegister {
    async fn count(&self, cache_path: &str) -> CacheResult<Option<i64>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.hget(TABLE, cache_path).await?;
        match value {
            None => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| CacheError::RegisterEntryInvalid {
                    path: cache_path.to_string(),
                    value: raw,
                }),
        }
    }

    async fn register(&self, cache_path: &str) -> CacheResult<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = conn.hincr(TABLE, cache_path, 1).await?;
        debug!("registered cache {} (count {})", cache_path, count);
        Ok(count)
    }

    async fn deregister(&self, cache_path: &str, locked: bool) -> CacheResult<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = Script::new(DEREGISTER_SCRIPT)
            .key(TABLE)
            .arg(cache_path)
            .arg(i32::from(locked))
            .invoke_async(&mut conn)
            .await?;

        if count < 0 {
            return Err(CacheError::NotRegistered(cache_path.to_string()));
        }
        debug!("deregistered cache {} (count {})", cache_path, count);
        Ok(count)
    }

    async fn records(&self) -> CacheResult<HashMap<String, i64>> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn.hgetall(TABLE).await?;
        raw.into_iter()
            .map(|(path, value)| {
                value
                    .parse::<i64>()
                    .map(|count| (path.clone(), count))
                    .map_err(|_| CacheError::RegisterEntryInvalid { path, value })
            })
            .collect()
    }
}
