//! services/offline/src/adapters/kv_store.rs
//!
//! The SQLite implementation of the `KeyValueStore` port. Each declared object
//! store becomes its own table holding JSON documents, with one expression index
//! per declared secondary index.

use async_trait::async_trait;
use sqlx::SqlitePool;
use story_offline_core::ports::{KeyValueStore, PortError, PortResult, Record};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::storage_error;

//=========================================================================================
// Schema Declarations
//=========================================================================================

/// A secondary index over one top-level field of the stored documents.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub key_path: String,
}

/// Declares one object store. Bumping `version` drops and recreates the store.
#[derive(Debug, Clone)]
pub struct StoreSchema {
    pub name: String,
    pub version: i64,
    pub key_path: String,
    pub indexes: Vec<IndexSpec>,
}

impl StoreSchema {
    pub fn new(name: &str, version: i64, key_path: &str) -> Self {
        Self {
            name: name.to_string(),
            version,
            key_path: key_path.to_string(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, name: &str, key_path: &str) -> Self {
        self.indexes.push(IndexSpec {
            name: name.to_string(),
            key_path: key_path.to_string(),
        });
        self
    }

    fn table(&self) -> String {
        format!("kv_{}", self.name)
    }
}

// Store, index and field names are spliced into SQL, so they are restricted to
// identifier characters.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A key-value store adapter backed by SQLite through `sqlx`.
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    schemas: Vec<StoreSchema>,
    opened: OnceCell<()>,
}

impl SqliteKeyValueStore {
    /// Creates a new store. Schema setup is deferred to the first `open` or operation.
    pub fn new(pool: SqlitePool, schemas: Vec<StoreSchema>) -> PortResult<Self> {
        for schema in &schemas {
            let names_valid = is_identifier(&schema.name)
                && is_identifier(&schema.key_path)
                && schema
                    .indexes
                    .iter()
                    .all(|i| is_identifier(&i.name) && is_identifier(&i.key_path));
            if !names_valid {
                return Err(PortError::Validation(format!(
                    "Invalid schema declaration for store '{}'",
                    schema.name
                )));
            }
        }
        Ok(Self {
            pool,
            schemas,
            opened: OnceCell::new(),
        })
    }

    fn schema(&self, store: &str) -> PortResult<&StoreSchema> {
        self.schemas
            .iter()
            .find(|s| s.name == store)
            .ok_or_else(|| PortError::StorageUnavailable(format!("Unknown object store '{}'", store)))
    }

    async fn ensure_open(&self) -> PortResult<()> {
        self.opened
            .get_or_try_init(|| async { self.setup_schemas().await })
            .await
            .map(|_| ())
    }

    async fn setup_schemas(&self) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_schema (store TEXT PRIMARY KEY, version INTEGER NOT NULL)",
        )
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for schema in &self.schemas {
            let table = schema.table();
            let existing: Option<i64> =
                sqlx::query_scalar("SELECT version FROM kv_schema WHERE store = ?1")
                    .bind(&schema.name)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage_error)?;

            match existing {
                Some(version) if version == schema.version => {
                    debug!("Object store '{}' is at version {}.", schema.name, version);
                    continue;
                }
                Some(version) => {
                    let discarded: i64 =
                        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                            .fetch_one(&mut *tx)
                            .await
                            .map_err(storage_error)?;
                    warn!(
                        "Object store '{}' changed from version {} to {}; dropping it and discarding {} records.",
                        schema.name, version, schema.version, discarded
                    );
                    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_error)?;
                }
                None => {}
            }

            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                table
            ))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            for index in &schema.indexes {
                sqlx::query(&format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} (json_extract(value, '$.{}'))",
                    table, index.name, table, index.key_path
                ))
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
            }

            sqlx::query(
                "INSERT INTO kv_schema (store, version) VALUES (?1, ?2)
                 ON CONFLICT (store) DO UPDATE SET version = excluded.version",
            )
            .bind(&schema.name)
            .bind(schema.version)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            info!(
                "Object store '{}' created at version {}.",
                schema.name, schema.version
            );
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn table_for(&self, store: &str) -> PortResult<String> {
        self.ensure_open().await?;
        Ok(self.schema(store)?.table())
    }
}

fn decode(key: String, raw: String) -> PortResult<Record> {
    let value = serde_json::from_str(&raw).map_err(|e| {
        PortError::Unexpected(format!("Corrupt record '{}': {}", key, e))
    })?;
    Ok(Record { key, value })
}

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn open(&self) -> PortResult<()> {
        self.ensure_open().await
    }

    async fn put(&self, store: &str, record: Record) -> PortResult<()> {
        let table = self.table_for(store).await?;
        sqlx::query(&format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            table
        ))
        .bind(&record.key)
        .bind(record.value.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> PortResult<Option<Record>> {
        let table = self.table_for(store).await?;
        let row: Option<(String, String)> =
            sqlx::query_as(&format!("SELECT key, value FROM {} WHERE key = ?1", table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        row.map(|(key, raw)| decode(key, raw)).transpose()
    }

    async fn get_all(&self, store: &str) -> PortResult<Vec<Record>> {
        let table = self.table_for(store).await?;
        let rows: Vec<(String, String)> =
            sqlx::query_as(&format!("SELECT key, value FROM {} ORDER BY key", table))
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;

        rows.into_iter().map(|(key, raw)| decode(key, raw)).collect()
    }

    async fn delete(&self, store: &str, key: &str) -> PortResult<()> {
        let table = self.table_for(store).await?;
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?1", table))
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn clear(&self, store: &str) -> PortResult<()> {
        let table = self.table_for(store).await?;
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn count(&self, store: &str) -> PortResult<u64> {
        let table = self.table_for(store).await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::connect_pool;
    use serde_json::json;

    fn notes_schema(version: i64) -> StoreSchema {
        StoreSchema::new("notes", version, "id").with_index("title", "title")
    }

    fn note(id: &str, title: &str) -> Record {
        Record {
            key: id.to_string(),
            value: json!({ "id": id, "title": title }),
        }
    }

    #[tokio::test]
    async fn test_put_get_overwrite_and_delete() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let store = SqliteKeyValueStore::new(pool, vec![notes_schema(1)]).unwrap();
        store.open().await.unwrap();
        store.open().await.unwrap();

        store.put("notes", note("a", "first")).await.unwrap();
        store.put("notes", note("a", "second")).await.unwrap();
        assert_eq!(store.count("notes").await.unwrap(), 1);

        let record = store.get("notes", "a").await.unwrap().unwrap();
        assert_eq!(record.value["title"], "second");

        assert!(store.get("notes", "missing").await.unwrap().is_none());

        store.delete("notes", "a").await.unwrap();
        store.delete("notes", "a").await.unwrap();
        assert_eq!(store.count("notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_and_get_all() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let store = SqliteKeyValueStore::new(pool, vec![notes_schema(1)]).unwrap();

        store.put("notes", note("b", "two")).await.unwrap();
        store.put("notes", note("a", "one")).await.unwrap();
        let all = store.get_all("notes").await.unwrap();
        assert_eq!(all.len(), 2);

        store.clear("notes").await.unwrap();
        assert!(store.get_all("notes").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_store_is_unavailable() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();
        let store = SqliteKeyValueStore::new(pool, vec![notes_schema(1)]).unwrap();

        let err = store.count("missing").await.unwrap_err();
        assert!(matches!(err, PortError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_version_bump_drops_records() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();

        let v1 = SqliteKeyValueStore::new(pool.clone(), vec![notes_schema(1)]).unwrap();
        v1.put("notes", note("a", "kept?")).await.unwrap();
        assert_eq!(v1.count("notes").await.unwrap(), 1);

        let same = SqliteKeyValueStore::new(pool.clone(), vec![notes_schema(1)]).unwrap();
        assert_eq!(same.count("notes").await.unwrap(), 1);

        let v2 = SqliteKeyValueStore::new(pool, vec![notes_schema(2)]).unwrap();
        assert_eq!(v2.count("notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_version_bump_fails_when_old_records_cannot_be_counted() {
        let pool = connect_pool("sqlite::memory:").await.unwrap();

        let v1 = SqliteKeyValueStore::new(pool.clone(), vec![notes_schema(1)]).unwrap();
        v1.open().await.unwrap();
        sqlx::query("DROP TABLE kv_notes").execute(&pool).await.unwrap();

        let v2 = SqliteKeyValueStore::new(pool, vec![notes_schema(2)]).unwrap();
        let err = v2.open().await.unwrap_err();
        assert!(matches!(err, PortError::StorageUnavailable(_)));
    }

    #[test]
    fn test_rejects_non_identifier_names() {
        assert!(is_identifier("bookmarks"));
        assert!(!is_identifier("drop table; --"));
        assert!(!is_identifier(""));
    }
}
