//! crates/story_offline_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the offline layer.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store, cache, network, and platform signals.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::domain::{CachedResponse, Connectivity, HttpRequest, HttpResponse, Notice};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The single tagged error type shared by every port and component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// Bad input. Surfaced immediately, never retried.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// Network unreachable or timed out. The only class eligible for queuing or fallback.
    #[error("Network unreachable: {0}")]
    Connectivity(String),
    /// The underlying store could not be opened or a transaction failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Authentication required: {0}")]
    AuthRequired(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PortError::Connectivity(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Key-Value Store
//=========================================================================================

/// A single record in a key-value store. The key is extracted from the value's
/// declared key path by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
}

/// A durable, transactional key-value store made of named object stores.
///
/// A missing record is not an error: `get` returns `Ok(None)`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Performs schema setup once. Calling it again is a no-op.
    async fn open(&self) -> PortResult<()>;

    /// Inserts or overwrites the record with the same key.
    async fn put(&self, store: &str, record: Record) -> PortResult<()>;

    async fn get(&self, store: &str, key: &str) -> PortResult<Option<Record>>;

    async fn get_all(&self, store: &str) -> PortResult<Vec<Record>>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, store: &str, key: &str) -> PortResult<()>;

    async fn clear(&self, store: &str) -> PortResult<()>;

    async fn count(&self, store: &str) -> PortResult<u64>;
}

//=========================================================================================
// HTTP Cache
//=========================================================================================

/// Named, durable caches of request/response pairs.
#[async_trait]
pub trait HttpCache: Send + Sync {
    async fn open(&self, cache: &str) -> PortResult<()>;

    /// Looks up an entry. Entries past their cache's max age are reported as a miss
    /// and removed.
    async fn lookup(&self, cache: &str, key: &str) -> PortResult<Option<CachedResponse>>;

    /// Stores an entry, evicting the oldest entries if the cache is over budget.
    async fn put(&self, cache: &str, key: &str, response: CachedResponse) -> PortResult<()>;

    /// Stores an entry only if the key is free. Returns `false`, leaving the
    /// existing entry untouched, when the key is already taken.
    async fn insert(&self, cache: &str, key: &str, response: CachedResponse) -> PortResult<bool>;

    /// Keys in insertion order, oldest first.
    async fn keys(&self, cache: &str) -> PortResult<Vec<String>>;

    /// Returns whether an entry was removed.
    async fn delete(&self, cache: &str, key: &str) -> PortResult<bool>;

    async fn cache_names(&self) -> PortResult<Vec<String>>;

    async fn delete_cache(&self, cache: &str) -> PortResult<bool>;
}

//=========================================================================================
// Network, Connectivity, and Notification Ports
//=========================================================================================

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Sends a request upstream. Any HTTP status is a successful fetch; only
    /// transport failures are errors, reported as `PortError::Connectivity`.
    async fn fetch(&self, request: &HttpRequest) -> PortResult<HttpResponse>;
}

pub type ConnectivityStream = Pin<Box<dyn Stream<Item = Connectivity> + Send>>;

/// The platform's view of whether the network is reachable.
pub trait ConnectivitySource: Send + Sync {
    fn current(&self) -> Connectivity;

    /// A stream of reported connectivity values, starting after `current()`.
    fn signals(&self) -> ConnectivityStream;
}

/// Surfaces transient, user-visible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
