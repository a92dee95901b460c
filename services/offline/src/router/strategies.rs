//! services/offline/src/router/strategies.rs
//!
//! The caching strategies the router dispatches to. Each returns `None` when it
//! has nothing to serve, leaving the fallback decision to the router.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{CachedResponse, HttpRequest, HttpResponse};
use story_offline_core::ports::{HttpCache, NetworkClient};
use tracing::{debug, warn};

/// Only complete, successful responses are worth keeping.
pub fn is_cacheable(response: &HttpResponse) -> bool {
    response.status == 200
}

pub async fn store(cache: &dyn HttpCache, cache_name: &str, key: &str, response: &HttpResponse) {
    let entry = CachedResponse::from_response(response, Utc::now());
    if let Err(e) = cache.put(cache_name, key, entry).await {
        warn!("Failed to write '{}' to cache '{}': {}", key, cache_name, e);
    }
}

pub async fn lookup(cache: &dyn HttpCache, cache_name: &str, key: &str) -> Option<HttpResponse> {
    match cache.lookup(cache_name, key).await {
        Ok(Some(hit)) => {
            debug!("Cache '{}' hit for '{}'.", cache_name, key);
            Some(hit.into_response())
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Cache '{}' lookup for '{}' failed: {}", cache_name, key, e);
            None
        }
    }
}

/// Fetches and populates the cache on a cacheable response.
async fn fetch_and_store(
    cache: &dyn HttpCache,
    network: &dyn NetworkClient,
    request: &HttpRequest,
    cache_name: &str,
    key: &str,
) -> Option<HttpResponse> {
    match network.fetch(request).await {
        Ok(response) => {
            if is_cacheable(&response) {
                store(cache, cache_name, key, &response).await;
            }
            Some(response)
        }
        Err(e) => {
            debug!("Network fetch for {} failed: {}", request.url, e);
            None
        }
    }
}

/// Network first, raced against `timeout`; the cache answers when the network
/// fails or loses the race.
///
/// The network future is dropped when the timer wins, so a late response can
/// neither reach this caller nor write to the cache.
pub async fn network_first(
    cache: &dyn HttpCache,
    network: &dyn NetworkClient,
    request: &HttpRequest,
    cache_name: &str,
    key: &str,
    timeout: Duration,
) -> Option<HttpResponse> {
    let fetched = tokio::time::timeout(
        timeout,
        fetch_and_store(cache, network, request, cache_name, key),
    )
    .await;

    match fetched {
        Ok(Some(response)) => return Some(response),
        Ok(None) => {}
        Err(_) => debug!(
            "Network for {} did not answer within {:?}; trying cache.",
            request.url, timeout
        ),
    }
    lookup(cache, cache_name, key).await
}

/// Cache first; on a miss, the network fills the cache.
pub async fn cache_first(
    cache: &dyn HttpCache,
    network: &dyn NetworkClient,
    request: &HttpRequest,
    cache_name: &str,
    key: &str,
) -> Option<HttpResponse> {
    if let Some(hit) = lookup(cache, cache_name, key).await {
        return Some(hit);
    }
    fetch_and_store(cache, network, request, cache_name, key).await
}

/// Serves the cached copy immediately and refreshes it in the background. The
/// refreshed copy is only visible to later requests.
pub async fn stale_while_revalidate(
    cache: Arc<dyn HttpCache>,
    network: Arc<dyn NetworkClient>,
    request: &HttpRequest,
    cache_name: &'static str,
    key: &str,
) -> Option<HttpResponse> {
    let Some(hit) = lookup(cache.as_ref(), cache_name, key).await else {
        return fetch_and_store(cache.as_ref(), network.as_ref(), request, cache_name, key).await;
    };

    let request = request.clone();
    let key = key.to_string();
    tokio::spawn(async move {
        fetch_and_store(cache.as_ref(), network.as_ref(), &request, cache_name, &key).await;
    });
    Some(hit)
}
