//! Postgres-backed graph cache store
//!
//! One row per cache key holding the JSON-serialized graph payload and a
//! timestamp. Supports atomic upsert and "fetch if newer than N hours".
//! Every operation is best-effort: a store constructed without a database
//! URL (or whose connection failed) disables caching without failing the
//! request path.

use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::models::{CacheEntry, GraphPayload};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS search_cache (
        cache_key  TEXT PRIMARY KEY,
        nodes      JSONB NOT NULL,
        edges      JSONB NOT NULL,
        clusters   JSONB NOT NULL,
        meta       JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

const UPSERT_SQL: &str = r#"
    INSERT INTO search_cache (cache_key, nodes, edges, clusters, meta, created_at)
    VALUES ($1, $2, $3, $4, $5, NOW())
    ON CONFLICT (cache_key) DO UPDATE
    SET nodes = EXCLUDED.nodes,
        edges = EXCLUDED.edges,
        clusters = EXCLUDED.clusters,
        meta = EXCLUDED.meta,
        created_at = NOW()
"#;

const FETCH_FRESH_SQL: &str = r#"
    SELECT nodes, edges, clusters, meta, created_at
    FROM search_cache
    WHERE cache_key = $1
      AND created_at > NOW() - ($2 || ' hours')::interval
"#;

/// Cache store for assembled graph responses.
#[derive(Clone)]
pub struct GraphCacheStore {
    pool: Option<PgPool>,
}

impl GraphCacheStore {
    /// Connect to Postgres, or return a disabled store when no URL is
    /// configured or the connection attempt fails.
    pub async fn connect(config: &DatabaseConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            info!("Database URL not configured, graph cache disabled");
            return Self { pool: None };
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await;

        match pool {
            Ok(pool) => {
                if let Err(e) = sqlx::query(CREATE_TABLE_SQL).execute(&pool).await {
                    warn!(error = %e, "Failed to ensure search_cache table, cache disabled");
                    return Self { pool: None };
                }
                info!("Graph cache store connected");
                Self { pool: Some(pool) }
            }
            Err(e) => {
                warn!(error = %e, "Database connection failed, graph cache disabled");
                Self { pool: None }
            }
        }
    }

    /// A store that never caches (for tests and cache-less deployments).
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Fetch a cached entry if its row is newer than `max_age_hours`.
    ///
    /// Lookup failures (missing table, connection loss) degrade to a miss.
    pub async fn fetch_fresh(&self, cache_key: &str, max_age_hours: i64) -> Option<CacheEntry> {
        let pool = self.pool.as_ref()?;

        let row = sqlx::query(FETCH_FRESH_SQL)
            .bind(cache_key)
            .bind(max_age_hours.to_string())
            .fetch_optional(pool)
            .await;

        let row = match row {
            Ok(row) => row?,
            Err(e) => {
                debug!(error = %e, cache_key, "Cache lookup skipped");
                return None;
            }
        };

        let entry = (|| -> Result<CacheEntry> {
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            Ok(CacheEntry {
                cache_key: cache_key.to_string(),
                payload: GraphPayload {
                    nodes: serde_json::from_value(row.try_get("nodes")?)?,
                    edges: serde_json::from_value(row.try_get("edges")?)?,
                    clusters: serde_json::from_value(row.try_get("clusters")?)?,
                    meta: serde_json::from_value(row.try_get("meta")?)?,
                },
                created_at,
            })
        })();

        match entry {
            Ok(entry) => {
                debug!(cache_key, "Graph cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(error = %e, cache_key, "Cached payload failed to decode, treating as miss");
                None
            }
        }
    }

    /// Insert-or-replace the row for `cache_key`, resetting `created_at`.
    ///
    /// Each write carries a fully independent payload snapshot, so concurrent
    /// writes for the same key are last-writer-wins with no read-modify-write
    /// race. Failures are logged and swallowed.
    pub async fn upsert(&self, cache_key: &str, payload: &GraphPayload) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };

        let encoded = (|| -> Result<_> {
            Ok((
                serde_json::to_value(&payload.nodes)?,
                serde_json::to_value(&payload.edges)?,
                serde_json::to_value(&payload.clusters)?,
                serde_json::to_value(&payload.meta)?,
            ))
        })();

        let (nodes, edges, clusters, meta) = match encoded {
            Ok(values) => values,
            Err(e) => {
                warn!(error = %e, cache_key, "Failed to serialize payload for cache write");
                return;
            }
        };

        let result = sqlx::query(UPSERT_SQL)
            .bind(cache_key)
            .bind(nodes)
            .bind(edges)
            .bind(clusters)
            .bind(meta)
            .execute(pool)
            .await;

        match result {
            Ok(_) => debug!(cache_key, "Graph cache written"),
            Err(e) => debug!(error = %e, cache_key, "Cache write skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_store_degrades_silently() {
        let store = GraphCacheStore::disabled();
        assert!(!store.is_connected());

        // Lookup is a miss, write is a no-op; neither panics or errors.
        assert!(store.fetch_fresh("abc", 24).await.is_none());
        store.upsert("abc", &GraphPayload::default()).await;
    }

    #[tokio::test]
    async fn test_missing_url_disables_store() {
        let store = GraphCacheStore::connect(&DatabaseConfig::default()).await;
        assert!(!store.is_connected());
    }
}
