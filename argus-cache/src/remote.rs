//! L2 remote cache over Redis.
//!
//! Keys are namespaced under `argus:` so `clear` and pattern invalidation
//! never touch foreign data. Every call runs under a timeout; the tier
//! manager treats timeouts and transport errors as misses.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{info, warn};

use crate::{CacheError, CachedResult};

const KEY_PREFIX: &str = "argus:";

#[derive(Clone)]
pub struct RemoteCache {
    conn: redis::aio::ConnectionManager,
    timeout: Duration,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache").field("timeout", &self.timeout).finish()
    }
}

impl RemoteCache {
    /// Connect to the remote tier. Returns `None` when the endpoint is
    /// unreachable so the stack degrades to L1 + L3.
    pub async fn connect(endpoint: &str, timeout: Duration) -> Option<Self> {
        let client = match redis::Client::open(endpoint) {
            Ok(client) => client,
            Err(err) => {
                warn!(endpoint, error = %err, "invalid remote cache endpoint");
                return None;
            }
        };
        let connect = redis::aio::ConnectionManager::new(client);
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(conn)) => {
                info!(endpoint, "connected remote cache tier");
                Some(Self { conn, timeout })
            }
            Ok(Err(err)) => {
                warn!(endpoint, error = %err, "remote cache unavailable");
                None
            }
            Err(_) => {
                warn!(endpoint, "remote cache connection timed out");
                None
            }
        }
    }

    fn key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    pub async fn get(&self, key: &str) -> Result<Option<CachedResult>, CacheError> {
        let mut conn = self.conn.clone();
        let namespaced = Self::key(key);
        let fetch = async move { conn.get::<_, Option<Vec<u8>>>(namespaced).await };
        let bytes = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| CacheError::RemoteTimeout)??;
        match bytes {
            Some(bytes) => {
                let cached: CachedResult = serde_json::from_slice(&bytes)?;
                if cached.is_expired() {
                    return Ok(None);
                }
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &CachedResult) -> Result<(), CacheError> {
        let ttl = value.remaining_ttl();
        if ttl == 0 {
            return Ok(());
        }
        let bytes = serde_json::to_vec(value)?;
        let mut conn = self.conn.clone();
        let namespaced = Self::key(key);
        let store = async move { conn.set_ex::<_, _, ()>(namespaced, bytes, ttl as u64).await };
        tokio::time::timeout(self.timeout, store)
            .await
            .map_err(|_| CacheError::RemoteTimeout)??;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let namespaced = Self::key(key);
        let del = async move { conn.del::<_, ()>(namespaced).await };
        tokio::time::timeout(self.timeout, del)
            .await
            .map_err(|_| CacheError::RemoteTimeout)??;
        Ok(())
    }

    /// Delete every namespaced key containing `pattern`; with `None`, every
    /// namespaced key. Uses cursor-based SCAN so a large keyspace never
    /// blocks the server the way KEYS would.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        let glob = match pattern {
            Some(p) => format!("{KEY_PREFIX}*{p}*"),
            None => format!("{KEY_PREFIX}*"),
        };
        let mut conn = self.conn.clone();
        let scan = async move {
            let keys: Vec<String> = {
                let mut collected = Vec::new();
                let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&glob).await?;
                while let Some(key) = iter.next_item().await {
                    collected.push(key);
                }
                collected
            };
            if keys.is_empty() {
                return Ok::<usize, redis::RedisError>(0);
            }
            let count = keys.len();
            conn.del::<_, ()>(keys).await?;
            Ok(count)
        };
        let removed = tokio::time::timeout(self.timeout, scan)
            .await
            .map_err(|_| CacheError::RemoteTimeout)??;
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.invalidate(None).await?;
        Ok(())
    }
}
