//! services/offline/src/queue.rs
//!
//! The pending-submission queue. Submissions whose network attempt failed for
//! lack of connectivity are persisted in the `offline-forms` HTTP cache and
//! replayed, oldest first, once connectivity returns.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use story_offline_core::domain::{
    CachedResponse, Notice, PendingSubmission, SubmissionPayload, SubmissionReceipt,
};
use story_offline_core::ports::{HttpCache, NetworkClient, Notifier, PortError, PortResult};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::submit::submission_request;

pub const OFFLINE_FORMS_CACHE: &str = "offline-forms";
const KEY_PREFIX: &str = "/offline-form-";

/// Something that can be asked to flush without waiting for the result.
#[async_trait]
pub trait FlushTrigger: Send + Sync {
    async fn trigger_flush(&self);
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
    pub retained: usize,
    /// True when another flush was already running and this call did nothing.
    pub skipped: bool,
}

impl FlushReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

//=========================================================================================
// "Impure" Stored Representation
//=========================================================================================

/// The JSON body a pending submission is persisted as.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSubmission {
    created_at: i64,
    description: String,
    photo: String,
    photo_content_type: String,
    lat: Option<f64>,
    lon: Option<f64>,
    token: String,
}

impl StoredSubmission {
    fn from_domain(created_at: i64, payload: &SubmissionPayload) -> Self {
        Self {
            created_at,
            description: payload.description.clone(),
            photo: STANDARD.encode(&payload.photo),
            photo_content_type: payload.photo_content_type.clone(),
            lat: payload.lat,
            lon: payload.lon,
            token: payload.token.clone(),
        }
    }

    fn to_domain(self, key: String) -> PortResult<PendingSubmission> {
        let photo = STANDARD
            .decode(self.photo.as_bytes())
            .map_err(|e| PortError::Unexpected(format!("Corrupt photo in {}: {}", key, e)))?;
        Ok(PendingSubmission {
            key,
            created_at: self.created_at,
            payload: SubmissionPayload {
                description: self.description,
                photo: Bytes::from(photo),
                photo_content_type: self.photo_content_type,
                lat: self.lat,
                lon: self.lon,
                token: self.token,
            },
        })
    }
}

//=========================================================================================
// The Queue
//=========================================================================================

struct QueueInner {
    cache: Arc<dyn HttpCache>,
    network: Arc<dyn NetworkClient>,
    notifier: Arc<dyn Notifier>,
    submit_url: Url,
    last_stamp: Mutex<i64>,
    flushing: AtomicBool,
}

/// A cheaply clonable handle; clones share the same backing store and the same
/// in-progress flag.
#[derive(Clone)]
pub struct PendingSubmissionQueue {
    inner: Arc<QueueInner>,
}

/// Clears the in-progress flag however the flush ends.
struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn queue_key(stamp: i64) -> String {
    format!("{}{:020}", KEY_PREFIX, stamp)
}

fn stamp_of(key: &str) -> Option<i64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

impl PendingSubmissionQueue {
    pub fn new(
        cache: Arc<dyn HttpCache>,
        network: Arc<dyn NetworkClient>,
        notifier: Arc<dyn Notifier>,
        submit_url: Url,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                cache,
                network,
                notifier,
                submit_url,
                last_stamp: Mutex::new(0),
                flushing: AtomicBool::new(false),
            }),
        }
    }

    // Raises the stamp floor so later stamps sort after `stamp`.
    fn observe_stamp(&self, stamp: i64) {
        if let Ok(mut last) = self.inner.last_stamp.lock() {
            *last = (*last).max(stamp);
        }
    }

    // New stamps always sort after every stored entry, even when the clock went
    // backwards or another queue shares the cache.
    async fn observe_stored_stamps(&self) -> PortResult<()> {
        let keys = self.inner.cache.keys(OFFLINE_FORMS_CACHE).await?;
        if let Some(newest) = keys.iter().filter_map(|k| stamp_of(k)).max() {
            self.observe_stamp(newest);
        }
        Ok(())
    }

    // Millisecond stamps, bumped by one on collision so keys stay unique and ordered.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.inner.last_stamp.lock() {
            Ok(mut last) => {
                let next = now.max(*last + 1);
                *last = next;
                next
            }
            Err(_) => now,
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Persists a submission for later delivery and acknowledges it as stored.
    pub async fn enqueue(&self, payload: SubmissionPayload) -> PortResult<SubmissionReceipt> {
        self.observe_stored_stamps().await?;

        // Another queue on the same cache may have taken the key; move past it.
        let key = loop {
            let stamp = self.next_stamp();
            let key = queue_key(stamp);
            let body = serde_json::to_vec(&StoredSubmission::from_domain(stamp, &payload))
                .map_err(|e| PortError::Unexpected(e.to_string()))?;

            let mut headers = BTreeMap::new();
            headers.insert("content-type".to_string(), "application/json".to_string());
            let entry = CachedResponse {
                status: 200,
                headers,
                body: Bytes::from(body),
                stored_at: Utc::now(),
            };

            let inserted = self
                .inner
                .cache
                .insert(OFFLINE_FORMS_CACHE, &key, entry)
                .await
                .map_err(|e| {
                    error!("Failed to store submission offline: {}", e);
                    e
                })?;
            if inserted {
                break key;
            }
            debug!("Queue key {} is taken; trying the next stamp.", key);
            self.observe_stamp(stamp);
        };

        info!("Submission stored offline as {}.", key);
        self.inner
            .notifier
            .notify(Notice::SubmissionStoredOffline { key: key.clone() });

        Ok(SubmissionReceipt {
            local_id: Uuid::new_v4(),
            queued: true,
            queue_key: Some(key),
            message: "Stored offline. It will be sent when the connection returns.".to_string(),
        })
    }

    /// Every stored submission, oldest first. Unreadable entries are skipped.
    pub async fn pending(&self) -> PortResult<Vec<PendingSubmission>> {
        let keys = self.inner.cache.keys(OFFLINE_FORMS_CACHE).await?;
        let mut entries = Vec::with_capacity(keys.len());

        for key in keys.into_iter().filter(|k| k.starts_with(KEY_PREFIX)) {
            let Some(cached) = self.inner.cache.lookup(OFFLINE_FORMS_CACHE, &key).await? else {
                continue;
            };
            let decoded = serde_json::from_slice::<StoredSubmission>(&cached.body)
                .map_err(|e| PortError::Unexpected(e.to_string()))
                .and_then(|stored| stored.to_domain(key.clone()));
            match decoded {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable queued submission {}: {}", key, e),
            }
        }

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    pub async fn count(&self) -> PortResult<usize> {
        let keys = self.inner.cache.keys(OFFLINE_FORMS_CACHE).await?;
        Ok(keys.iter().filter(|k| k.starts_with(KEY_PREFIX)).count())
    }

    /// Replays every stored submission in insertion order. Delivered entries are
    /// removed; failures stay queued without blocking the entries after them.
    ///
    /// Returns a skipped report when another flush is already running.
    pub async fn flush(&self) -> PortResult<FlushReport> {
        let Some(_guard) = FlushGuard::acquire(&self.inner.flushing) else {
            debug!("Flush already in progress; ignoring this trigger.");
            return Ok(FlushReport::skipped());
        };

        let entries = self.pending().await?;
        let mut report = FlushReport {
            attempted: entries.len(),
            ..FlushReport::default()
        };
        if entries.is_empty() {
            return Ok(report);
        }
        info!("Replaying {} queued submissions.", entries.len());

        for entry in entries {
            let request = submission_request(&self.inner.submit_url, &entry.payload);
            match self.inner.network.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if let Err(e) = self.inner.cache.delete(OFFLINE_FORMS_CACHE, &entry.key).await {
                        // Left in place; the next pass will send it again.
                        error!("Delivered {} but could not remove it: {}", entry.key, e);
                        report.retained += 1;
                        continue;
                    }
                    debug!("Delivered queued submission {}.", entry.key);
                    report.delivered += 1;
                }
                Ok(response) => {
                    warn!(
                        "Queued submission {} was rejected with status {}; keeping it.",
                        entry.key, response.status
                    );
                    report.retained += 1;
                }
                Err(e) => {
                    warn!("Queued submission {} could not be sent: {}", entry.key, e);
                    report.retained += 1;
                }
            }
        }

        info!(
            "Flush finished: {} delivered, {} retained.",
            report.delivered, report.retained
        );
        if report.delivered > 0 {
            self.inner.notifier.notify(Notice::SubmissionsSynced {
                delivered: report.delivered,
                retained: report.retained,
            });
        }
        Ok(report)
    }
}

#[async_trait]
impl FlushTrigger for PendingSubmissionQueue {
    async fn trigger_flush(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.flush().await {
                error!("Background flush failed: {}", e);
            }
        });
    }
}
