//! Best-effort read-through cache
//!
//! Cache failures never fail the primary operation: reads fall through to
//! the database and writes are fire-and-forget. Invalidation runs on the
//! write path after the transaction commits.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CacheConfig;

/// Cache keys
pub fn order_key(order_id: Uuid) -> String {
    format!("order:{}", order_id)
}

pub fn coverage_key(province: &str) -> String {
    format!("coverage:{}", province.to_lowercase())
}

pub fn delivery_key(tracking_number: &str) -> String {
    format!("delivery:tracking:{}", tracking_number)
}

/// Redis-backed cache; constructed disabled when no address is configured
#[derive(Clone)]
pub struct Cache {
    manager: Option<ConnectionManager>,
    ttl: Duration,
}

impl Cache {
    /// Connect to redis, or return a disabled cache when unconfigured or
    /// the connection cannot be established.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled() {
            return Self::disabled();
        }

        let url = if config.password.is_empty() {
            format!("redis://{}", config.addr)
        } else {
            format!("redis://:{}@{}", config.password, config.addr)
        };

        let manager = match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(manager) => Some(manager),
                Err(e) => {
                    warn!("Cache unavailable, continuing without: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Invalid cache configuration, continuing without: {}", e);
                None
            }
        };

        Self { manager, ttl: config.ttl() }
    }

    /// A cache that never hits; used in tests and cacheless deployments
    pub fn disabled() -> Self {
        Self { manager: None, ttl: Duration::from_secs(0) }
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_some()
    }

    /// Fetch and deserialize a cached value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.manager.clone()?;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("cache hit: {}", key);
                    Some(value)
                }
                Err(e) => {
                    warn!("cache deserialize failed for {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Store a value with the configured TTL; errors are logged and dropped
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(mut conn) = self.manager.clone() else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("cache serialize failed for {}: {}", key, e);
                return;
            }
        };

        if let Err(e) =
            conn.set_ex::<_, _, ()>(key, raw, self.ttl.as_secs()).await
        {
            warn!("cache write failed for {}: {}", key, e);
        }
    }

    /// Drop a key after a state change commits
    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.manager.clone() else {
            return;
        };

        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("cache invalidate failed for {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_misses() {
        let cache = Cache::disabled();
        assert!(!cache.is_enabled());

        let missing: Option<String> = cache.get("order:nothing").await;
        assert!(missing.is_none());

        // Writes and invalidations on a disabled cache are no-ops
        cache.put("order:nothing", &"value".to_string()).await;
        cache.invalidate("order:nothing").await;
    }

    #[test]
    fn test_key_shapes() {
        let id = Uuid::nil();
        assert_eq!(order_key(id), format!("order:{}", id));
        assert_eq!(coverage_key("Bangkok"), "coverage:bangkok");
        assert_eq!(delivery_key("BKK-260301-A7Q2MX"), "delivery:tracking:BKK-260301-A7Q2MX");
    }
}
