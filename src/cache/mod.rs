// src/cache/mod.rs
//
// Key-value cache with TTL, optional with graceful fallback (design doc §9:
// "the cache is a capability behind an interface with two implementations").
// Selection happens once at startup in `AppState::new` based on whether
// `CACHE_URL` is configured; callers never branch on it per call.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// A key-value cache with TTL. Both implementations are infallible from the
/// caller's perspective: a real backend failure degrades to a miss rather
/// than propagating an error, matching the "cache unavailable never
/// surfaces" rule in the error taxonomy.
#[async_trait]
pub trait CacheHandle: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, value: &str, ttl_seconds: i64);
    fn is_available(&self) -> bool;
}

/// Real cache, backed by a table in the same sqlite pool core already holds
/// a connection to. Stands in for an external KV store (e.g. Redis) behind
/// the same trait so swapping backends never touches call sites.
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheHandle for SqliteCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now().timestamp();
        let row = sqlx::query("SELECT value, expires_at FROM kv_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or(None)?;

        let expires_at: i64 = row.try_get("expires_at").ok()?;
        if expires_at <= now {
            debug!("cache entry expired: {}", key);
            let _ = sqlx::query("DELETE FROM kv_cache WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await;
            return None;
        }

        row.try_get("value").ok()
    }

    async fn put(&self, key: &str, value: &str, ttl_seconds: i64) {
        let now = Utc::now().timestamp();
        let expires_at = now + ttl_seconds.max(0);
        let _ = sqlx::query(
            "INSERT INTO kv_cache (key, value, created_at, expires_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// No-op cache used when `CACHE_URL` is unset. Every call is a miss.
pub struct NoOpCache;

#[async_trait]
impl CacheHandle for NoOpCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn put(&self, _key: &str, _value: &str, _ttl_seconds: i64) {}

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_cache_always_misses() {
        let cache = NoOpCache;
        cache.put("k", "v", 300).await;
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.is_available());
    }

    #[tokio::test]
    async fn sqlite_cache_round_trips_and_expires() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE kv_cache (key TEXT PRIMARY KEY, value TEXT NOT NULL, created_at INTEGER NOT NULL, expires_at INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let cache = SqliteCache::new(pool);
        assert!(cache.is_available());
        assert_eq!(cache.get("missing").await, None);

        cache.put("k", "v1", 300).await;
        assert_eq!(cache.get("k").await, Some("v1".to_string()));

        cache.put("expired", "v2", -1).await;
        assert_eq!(cache.get("expired").await, None);
    }
}
