//! services/offline/src/adapters/http_cache.rs
//!
//! The SQLite implementation of the `HttpCache` port. All named caches share one
//! table; the autoincrement sequence gives each entry its insertion order.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use story_offline_core::domain::CachedResponse;
use story_offline_core::ports::{HttpCache, PortError, PortResult};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::storage_error;

/// Expiration rules for one named cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl CachePolicy {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries: Some(max_entries),
            max_age: Some(max_age),
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An HTTP cache adapter backed by SQLite through `sqlx`.
pub struct SqliteHttpCache {
    pool: SqlitePool,
    policies: HashMap<String, CachePolicy>,
    opened: OnceCell<()>,
}

impl SqliteHttpCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            policies: HashMap::new(),
            opened: OnceCell::new(),
        }
    }

    /// Registers the expiration policy for a named cache.
    pub fn with_policy(mut self, cache: &str, policy: CachePolicy) -> Self {
        self.policies.insert(cache.to_string(), policy);
        self
    }

    fn policy(&self, cache: &str) -> CachePolicy {
        self.policies.get(cache).copied().unwrap_or_default()
    }

    async fn ensure_schema(&self) -> PortResult<()> {
        self.opened
            .get_or_try_init(|| async {
                sqlx::query(
                    "CREATE TABLE IF NOT EXISTS http_cache (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        cache_name TEXT NOT NULL,
                        request_key TEXT NOT NULL,
                        status INTEGER NOT NULL,
                        headers TEXT NOT NULL,
                        body BLOB NOT NULL,
                        stored_at INTEGER NOT NULL,
                        UNIQUE (cache_name, request_key)
                    )",
                )
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;

                sqlx::query("CREATE TABLE IF NOT EXISTS http_cache_names (cache_name TEXT PRIMARY KEY)")
                    .execute(&self.pool)
                    .await
                    .map_err(storage_error)?;
                Ok::<(), PortError>(())
            })
            .await
            .map(|_| ())
    }
}

impl SqliteHttpCache {
    async fn evict(&self, tx: &mut Transaction<'_, Sqlite>, cache: &str) -> PortResult<()> {
        let Some(max_entries) = self.policy(cache).max_entries else {
            return Ok(());
        };
        let evicted = sqlx::query(
            "DELETE FROM http_cache WHERE cache_name = ?1 AND seq NOT IN (
                SELECT seq FROM http_cache WHERE cache_name = ?1 ORDER BY seq DESC LIMIT ?2
            )",
        )
        .bind(cache)
        .bind(max_entries as i64)
        .execute(&mut **tx)
        .await
        .map_err(storage_error)?
        .rows_affected();
        if evicted > 0 {
            debug!("Cache '{}' evicted {} oldest entries.", cache, evicted);
        }
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Struct
//=========================================================================================

#[derive(sqlx::FromRow)]
struct CacheRow {
    status: i64,
    headers: String,
    body: Vec<u8>,
    stored_at: i64,
}

impl CacheRow {
    fn to_domain(self) -> PortResult<CachedResponse> {
        let headers: BTreeMap<String, String> = serde_json::from_str(&self.headers)
            .map_err(|e| PortError::Unexpected(format!("Corrupt cached headers: {}", e)))?;
        let stored_at = Utc
            .timestamp_millis_opt(self.stored_at)
            .single()
            .ok_or_else(|| PortError::Unexpected("Corrupt cache timestamp".to_string()))?;
        Ok(CachedResponse {
            status: u16::try_from(self.status).unwrap_or(200),
            headers,
            body: Bytes::from(self.body),
            stored_at,
        })
    }
}

//=========================================================================================
// `HttpCache` Trait Implementation
//=========================================================================================

#[async_trait]
impl HttpCache for SqliteHttpCache {
    async fn open(&self, cache: &str) -> PortResult<()> {
        self.ensure_schema().await?;
        sqlx::query("INSERT OR IGNORE INTO http_cache_names (cache_name) VALUES (?1)")
            .bind(cache)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn lookup(&self, cache: &str, key: &str) -> PortResult<Option<CachedResponse>> {
        self.ensure_schema().await?;
        let row: Option<CacheRow> = sqlx::query_as(
            "SELECT status, headers, body, stored_at FROM http_cache
             WHERE cache_name = ?1 AND request_key = ?2",
        )
        .bind(cache)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cached = row.to_domain()?;

        if let Some(max_age) = self.policy(cache).max_age {
            let age = Utc::now()
                .signed_duration_since(cached.stored_at)
                .to_std()
                .unwrap_or_default();
            if age > max_age {
                debug!("Cache '{}' entry '{}' expired after {:?}.", cache, key, age);
                self.delete(cache, key).await?;
                return Ok(None);
            }
        }

        Ok(Some(cached))
    }

    async fn put(&self, cache: &str, key: &str, response: CachedResponse) -> PortResult<()> {
        self.open(cache).await?;
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Delete-then-insert so a refreshed entry moves to the newest position.
        sqlx::query("DELETE FROM http_cache WHERE cache_name = ?1 AND request_key = ?2")
            .bind(cache)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        sqlx::query(
            "INSERT INTO http_cache (cache_name, request_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(cache)
        .bind(key)
        .bind(i64::from(response.status))
        .bind(headers)
        .bind(response.body.to_vec())
        .bind(response.stored_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        self.evict(&mut tx, cache).await?;
        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn insert(&self, cache: &str, key: &str, response: CachedResponse) -> PortResult<bool> {
        self.open(cache).await?;
        let headers = serde_json::to_string(&response.headers)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO http_cache (cache_name, request_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(cache)
        .bind(key)
        .bind(i64::from(response.status))
        .bind(headers)
        .bind(response.body.to_vec())
        .bind(response.stored_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected()
            > 0;

        if inserted {
            self.evict(&mut tx, cache).await?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(inserted)
    }

    async fn keys(&self, cache: &str) -> PortResult<Vec<String>> {
        self.ensure_schema().await?;
        sqlx::query_scalar("SELECT request_key FROM http_cache WHERE cache_name = ?1 ORDER BY seq ASC")
            .bind(cache)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn delete(&self, cache: &str, key: &str) -> PortResult<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query("DELETE FROM http_cache WHERE cache_name = ?1 AND request_key = ?2")
            .bind(cache)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn cache_names(&self) -> PortResult<Vec<String>> {
        self.ensure_schema().await?;
        sqlx::query_scalar(
            "SELECT cache_name FROM http_cache_names
             UNION SELECT DISTINCT cache_name FROM http_cache
             ORDER BY cache_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn delete_cache(&self, cache: &str) -> PortResult<bool> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let entries = sqlx::query("DELETE FROM http_cache WHERE cache_name = ?1")
            .bind(cache)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();
        let names = sqlx::query("DELETE FROM http_cache_names WHERE cache_name = ?1")
            .bind(cache)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();
        tx.commit().await.map_err(storage_error)?;
        Ok(entries + names > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::connect_pool;

    fn entry(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
            body: Bytes::from(body.to_string()),
            stored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let cache = SqliteHttpCache::new(pool);

        cache.put("pages", "GET /", entry("home")).await.unwrap();
        let hit = cache.lookup("pages", "GET /").await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from("home"));
        assert_eq!(hit.headers.get("content-type").unwrap(), "text/plain");

        assert!(cache.lookup("pages", "GET /other").await.unwrap().is_none());
        assert!(cache.lookup("other", "GET /").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_entries_evicts_oldest_first() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let cache = SqliteHttpCache::new(pool).with_policy(
            "images",
            CachePolicy {
                max_entries: Some(2),
                max_age: None,
            },
        );

        cache.put("images", "a", entry("a")).await.unwrap();
        cache.put("images", "b", entry("b")).await.unwrap();
        // Refreshing `a` makes `b` the oldest.
        cache.put("images", "a", entry("a2")).await.unwrap();
        cache.put("images", "c", entry("c")).await.unwrap();

        assert_eq!(cache.keys("images").await.unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_max_age_expires_lazily() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let cache = SqliteHttpCache::new(pool).with_policy(
            "stories",
            CachePolicy {
                max_entries: None,
                max_age: Some(Duration::from_secs(60 * 60 * 24)),
            },
        );

        let mut stale = entry("old");
        stale.stored_at = Utc::now() - chrono::Duration::days(2);
        cache.put("stories", "old", stale).await.unwrap();
        cache.put("stories", "fresh", entry("fresh")).await.unwrap();

        assert_eq!(cache.keys("stories").await.unwrap().len(), 2);
        assert!(cache.lookup("stories", "old").await.unwrap().is_none());
        assert!(cache.lookup("stories", "fresh").await.unwrap().is_some());
        assert_eq!(cache.keys("stories").await.unwrap(), vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_insert_never_overwrites() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let cache = SqliteHttpCache::new(pool);

        assert!(cache.insert("offline-forms", "k", entry("first")).await.unwrap());
        assert!(!cache.insert("offline-forms", "k", entry("second")).await.unwrap());
        let kept = cache.lookup("offline-forms", "k").await.unwrap().unwrap();
        assert_eq!(kept.body, Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_cache_names_and_delete_cache() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let cache = SqliteHttpCache::new(pool);

        cache.open("empty").await.unwrap();
        cache.put("pages", "GET /", entry("home")).await.unwrap();
        assert_eq!(cache.cache_names().await.unwrap(), vec!["empty", "pages"]);

        assert!(cache.delete_cache("pages").await.unwrap());
        assert!(!cache.delete_cache("pages").await.unwrap());
        assert_eq!(cache.cache_names().await.unwrap(), vec!["empty"]);
        assert!(cache.lookup("pages", "GET /").await.unwrap().is_none());
    }
}
