//! services/offline/src/bookmarks.rs
//!
//! The bookmark repository: CRUD over locally persisted stories.
//!
//! A bookmark's presence in the store is the only record of "is bookmarked".
//! Read operations feed UI rendering and degrade to safe defaults on storage
//! failures; write operations always report failures to the caller.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use story_offline_core::domain::{Bookmark, Story};
use story_offline_core::ports::{KeyValueStore, PortError, PortResult, Record};
use tracing::{debug, error, info, warn};

use crate::adapters::StoreSchema;

pub const BOOKMARK_STORE: &str = "bookmarks";
const BOOKMARK_SCHEMA_VERSION: i64 = 1;

/// The declared layout of the bookmark store: keyed by story id, indexed by
/// author name, creation time and bookmark time.
pub fn bookmark_schema() -> StoreSchema {
    StoreSchema::new(BOOKMARK_STORE, BOOKMARK_SCHEMA_VERSION, "id")
        .with_index("name", "name")
        .with_index("createdAt", "createdAt")
        .with_index("bookmarkedAt", "bookmarkedAt")
}

pub struct BookmarkRepository {
    store: Arc<dyn KeyValueStore>,
    last_stamp: Mutex<DateTime<Utc>>,
}

impl BookmarkRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            last_stamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    // Never hands out the same instant twice, so `list()` ordering stays strict
    // even when two adds land inside one clock tick.
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_stamp.lock() {
            Ok(mut last) => {
                let next = if now > *last {
                    now
                } else {
                    *last + Duration::microseconds(1)
                };
                *last = next;
                next
            }
            Err(_) => now,
        }
    }

    /// Bookmarks a story, overwriting any previous bookmark of the same id.
    pub async fn add(&self, story: &Story) -> PortResult<Bookmark> {
        if story.id.trim().is_empty() {
            return Err(PortError::Validation(
                "A story id is required to add a bookmark".to_string(),
            ));
        }

        let bookmark = Bookmark::from_story(story, self.next_stamp());
        let value =
            serde_json::to_value(&bookmark).map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.store
            .put(
                BOOKMARK_STORE,
                Record {
                    key: bookmark.id().to_string(),
                    value,
                },
            )
            .await
            .map_err(|e| {
                error!("Failed to add bookmark {}: {}", story.id, e);
                e
            })?;

        info!("Story bookmarked: {}", story.id);
        Ok(bookmark)
    }

    /// All bookmarks, most recently bookmarked first. Storage failures yield an
    /// empty list.
    pub async fn list(&self) -> Vec<Bookmark> {
        match self.try_list().await {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                warn!("Failed to list bookmarks, showing none: {}", e);
                Vec::new()
            }
        }
    }

    /// Like `list`, but reports storage failures.
    pub async fn try_list(&self) -> PortResult<Vec<Bookmark>> {
        let records = self.store.get_all(BOOKMARK_STORE).await?;
        let mut bookmarks: Vec<Bookmark> = records
            .into_iter()
            .filter_map(|record| match serde_json::from_value::<Bookmark>(record.value) {
                Ok(bookmark) => Some(bookmark),
                Err(e) => {
                    warn!("Skipping unreadable bookmark {}: {}", record.key, e);
                    None
                }
            })
            .collect();

        bookmarks.sort_by(|a, b| {
            b.bookmarked_at
                .cmp(&a.bookmarked_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        debug!("Retrieved {} bookmarks.", bookmarks.len());
        Ok(bookmarks)
    }

    pub async fn get(&self, id: &str) -> Option<Bookmark> {
        match self.store.get(BOOKMARK_STORE, id).await {
            Ok(Some(record)) => serde_json::from_value(record.value).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read bookmark {}: {}", id, e);
                None
            }
        }
    }

    /// Removes a bookmark. Removing an id that was never bookmarked succeeds.
    pub async fn remove(&self, id: &str) -> PortResult<()> {
        self.store.delete(BOOKMARK_STORE, id).await.map_err(|e| {
            error!("Failed to remove bookmark {}: {}", id, e);
            e
        })?;
        info!("Bookmark removed: {}", id);
        Ok(())
    }

    pub async fn clear(&self) -> PortResult<()> {
        self.store.clear(BOOKMARK_STORE).await.map_err(|e| {
            error!("Failed to clear bookmarks: {}", e);
            e
        })?;
        info!("All bookmarks cleared.");
        Ok(())
    }

    /// Never fails: a storage error reads as "not bookmarked".
    pub async fn is_bookmarked(&self, id: &str) -> bool {
        match self.store.get(BOOKMARK_STORE, id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Bookmark check for {} failed: {}", id, e);
                false
            }
        }
    }

    /// Never fails: a storage error reads as zero.
    pub async fn count(&self) -> u64 {
        self.store.count(BOOKMARK_STORE).await.unwrap_or_else(|e| {
            warn!("Failed to count bookmarks: {}", e);
            0
        })
    }
}
