//! Redis side-cache for provider responses
//!
//! Best-effort caching for the slow, rate-limited provider calls
//! (reference/citation lookups). If Redis is unavailable or not configured,
//! every operation silently no-ops; the request path never depends on it.

use crate::config::RedisConfig;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Best-effort Redis cache client.
pub struct SideCache {
    connection: Option<RwLock<MultiplexedConnection>>,
    refs_ttl_secs: u64,
}

impl SideCache {
    /// Connect to Redis, or return a disabled cache when no URL is
    /// configured or the connection attempt fails.
    pub async fn connect(config: &RedisConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            info!("Redis URL not configured, side-cache disabled");
            return Self::disabled();
        };

        let connection = async {
            let client = Client::open(url)?;
            client.get_multiplexed_async_connection().await
        }
        .await;

        match connection {
            Ok(conn) => {
                info!("Redis side-cache connected");
                Self {
                    connection: Some(RwLock::new(conn)),
                    refs_ttl_secs: config.refs_ttl_secs,
                }
            }
            Err(e) => {
                warn!(error = %e, "Redis connection failed, side-cache disabled");
                Self::disabled()
            }
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            connection: None,
            refs_ttl_secs: 0,
        }
    }

    pub fn enabled(&self) -> bool {
        self.connection.is_some()
    }

    /// TTL applied to cached reference/citation responses.
    pub fn refs_ttl_secs(&self) -> u64 {
        self.refs_ttl_secs
    }

    /// Get a cached value, treating every failure as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let connection = self.connection.as_ref()?;
        let mut conn = connection.write().await;

        let value: Option<String> = match conn.get(key).await {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, key, "Side-cache get failed");
                return None;
            }
        };

        let json = value?;
        match serde_json::from_str(&json) {
            Ok(parsed) => {
                debug!(key, "Side-cache hit");
                Some(parsed)
            }
            Err(e) => {
                debug!(error = %e, key, "Cached value failed to parse");
                None
            }
        }
    }

    /// Set a value with a TTL; failures are logged and swallowed.
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                debug!(error = %e, key, "Side-cache serialization failed");
                return;
            }
        };

        let mut conn = connection.write().await;
        if let Err(e) = conn.set_ex::<_, _, ()>(key, &json, ttl_secs).await {
            debug!(error = %e, key, "Side-cache set failed");
        } else {
            debug!(key, ttl_secs, "Side-cache set");
        }
    }
}

/// Cache key builder helpers
pub mod keys {
    /// Build a reference-lookup cache key
    pub fn refs(paper_id: &str, limit: usize) -> String {
        format!("refs:{}:{}", paper_id, limit)
    }

    /// Build a citation-lookup cache key
    pub fn cites(paper_id: &str, limit: usize) -> String {
        format!("cites:{}:{}", paper_id, limit)
    }

    /// Build a paper-detail cache key
    pub fn paper(paper_id: &str) -> String {
        format!("paper:{}", paper_id)
    }
}
