//! services/offline/src/router/mod.rs
//!
//! The cache router: the single entry point every intercepted request goes
//! through. It classifies the request, runs the matching caching strategy, and
//! synthesizes an offline answer when nothing else can respond. It always
//! returns a response.

pub mod placeholders;
pub mod rules;
pub mod strategies;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{HttpRequest, HttpResponse};
use story_offline_core::ports::{HttpCache, NetworkClient, PortError, PortResult};
use tracing::{debug, info, warn};
use url::Url;

use crate::adapters::CachePolicy;
use crate::config::Config;
pub use placeholders::Placeholders;
pub use rules::{RouteClass, RouteTable};

/// Names of the caches the router owns.
pub mod cache_names {
    pub const STORIES: &str = "stories";
    pub const STORY_DETAILS: &str = "story-details";
    pub const IMAGES: &str = "images";
    pub const STATIC_RESOURCES: &str = "static-resources";
    pub const CDN: &str = "cdn";
    pub const PAGES: &str = "pages";
    pub const RUNTIME: &str = "runtime";
    pub const APP_SHELL: &str = "app-shell";

    pub const ALL: &[&str] = &[
        STORIES,
        STORY_DETAILS,
        IMAGES,
        STATIC_RESOURCES,
        CDN,
        PAGES,
        RUNTIME,
        APP_SHELL,
    ];
}

const DAY: u64 = 60 * 60 * 24;

/// Expiration policies for the router's caches. Caches not listed never expire.
pub fn cache_policies() -> Vec<(&'static str, CachePolicy)> {
    vec![
        (cache_names::STORIES, CachePolicy::new(50, Duration::from_secs(DAY))),
        (cache_names::STORY_DETAILS, CachePolicy::new(100, Duration::from_secs(7 * DAY))),
        (cache_names::IMAGES, CachePolicy::new(100, Duration::from_secs(30 * DAY))),
        (cache_names::CDN, CachePolicy::new(50, Duration::from_secs(365 * DAY))),
    ]
}

fn offline_response() -> HttpResponse {
    HttpResponse::text(503, "Offline")
}

fn auth_offline_response() -> HttpResponse {
    HttpResponse::json(
        503,
        &json!({
            "error": true,
            "message": "Authentication requires internet connection",
        }),
    )
}

fn send_failed_response() -> HttpResponse {
    HttpResponse::json(
        503,
        &json!({
            "error": true,
            "message": "Offline mode - limited functionality",
        }),
    )
}

//=========================================================================================
// The Router
//=========================================================================================

pub struct CacheRouter {
    cache: Arc<dyn HttpCache>,
    network: Arc<dyn NetworkClient>,
    table: RouteTable,
    placeholders: Placeholders,
    timeout: Duration,
    app_origin: Url,
    index_url: Url,
    precache_urls: Vec<String>,
}

impl CacheRouter {
    pub fn new(
        cache: Arc<dyn HttpCache>,
        network: Arc<dyn NetworkClient>,
        config: &Config,
    ) -> PortResult<Self> {
        let table = RouteTable::new(
            &config.api_base_url,
            &config.app_origin,
            &config.extra_cache_first_origins,
        )
        .map_err(|e| PortError::Unexpected(format!("Invalid route pattern: {}", e)))?;
        let index_url = config
            .app_origin
            .join("/index.html")
            .map_err(|e| PortError::Validation(e.to_string()))?;

        Ok(Self {
            cache,
            network,
            table,
            placeholders: Placeholders::new(config.offline_placeholder_count),
            timeout: config.network_timeout,
            app_origin: config.app_origin.clone(),
            index_url,
            precache_urls: config.precache_urls.clone(),
        })
    }

    pub fn classify(&self, request: &HttpRequest) -> RouteClass {
        self.table.classify(request)
    }

    fn index_key(&self) -> String {
        format!("GET {}", self.index_url)
    }

    fn root_key(&self) -> String {
        format!("GET {}", self.app_origin)
    }

    /// Collections are keyed with an `offline=true` marker so they never collide
    /// with a detail entry for the same URL.
    fn collection_key(request: &HttpRequest) -> String {
        let mut url = request.url.clone();
        url.set_fragment(None);
        url.query_pairs_mut().append_pair("offline", "true");
        format!("GET {}", url)
    }

    /// Handles one intercepted request.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let class = self.table.classify(&request);
        debug!("{} {} routed as {:?}.", request.method, request.url, class);

        let cache = self.cache.as_ref();
        let network = self.network.as_ref();

        match class {
            RouteClass::NonGet => match network.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("{} {} failed: {}", request.method, request.url, e);
                    send_failed_response()
                }
            },

            RouteClass::Auth => match network.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Authentication request failed while offline: {}", e);
                    auth_offline_response()
                }
            },

            RouteClass::StoryDetail => {
                let key = request.cache_key();
                let served = strategies::network_first(
                    cache,
                    network,
                    &request,
                    cache_names::STORY_DETAILS,
                    &key,
                    self.timeout,
                )
                .await;
                served.unwrap_or_else(|| {
                    let id = request
                        .url
                        .path_segments()
                        .and_then(|segments| segments.last())
                        .unwrap_or_default();
                    info!("Serving offline placeholder for story '{}'.", id);
                    self.placeholders.story_detail(id)
                })
            }

            RouteClass::StoryCollection => {
                let key = Self::collection_key(&request);
                let served = strategies::network_first(
                    cache,
                    network,
                    &request,
                    cache_names::STORIES,
                    &key,
                    self.timeout,
                )
                .await;
                served.unwrap_or_else(|| {
                    info!("Serving offline placeholder stories for {}.", request.url);
                    self.placeholders.story_list()
                })
            }

            RouteClass::Image => strategies::cache_first(
                cache,
                network,
                &request,
                cache_names::IMAGES,
                &request.cache_key(),
            )
            .await
            .unwrap_or_else(offline_response),

            RouteClass::StaticAsset => strategies::stale_while_revalidate(
                Arc::clone(&self.cache),
                Arc::clone(&self.network),
                &request,
                cache_names::STATIC_RESOURCES,
                &request.cache_key(),
            )
            .await
            .unwrap_or_else(offline_response),

            RouteClass::ExtraCacheFirst => strategies::cache_first(
                cache,
                network,
                &request,
                cache_names::CDN,
                &request.cache_key(),
            )
            .await
            .unwrap_or_else(offline_response),

            RouteClass::Navigation => {
                let index_key = self.index_key();
                if let Some(response) = strategies::network_first(
                    cache,
                    network,
                    &request,
                    cache_names::PAGES,
                    &index_key,
                    self.timeout,
                )
                .await
                {
                    return response;
                }
                if let Some(shell) = strategies::lookup(cache, cache_names::APP_SHELL, &index_key).await {
                    return shell;
                }
                strategies::lookup(cache, cache_names::APP_SHELL, &self.root_key())
                    .await
                    .unwrap_or_else(offline_response)
            }

            RouteClass::SameOrigin => strategies::cache_first(
                cache,
                network,
                &request,
                cache_names::RUNTIME,
                &request.cache_key(),
            )
            .await
            .unwrap_or_else(offline_response),

            RouteClass::CrossOrigin => match network.fetch(&request).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Cross-origin request {} failed: {}", request.url, e);
                    offline_response()
                }
            },
        }
    }

    /// Precaches the app shell. Individual failures are logged and skipped.
    /// Returns how many entries were cached.
    pub async fn install(&self) -> usize {
        let mut cached = 0;
        for path in &self.precache_urls {
            let url = match self.app_origin.join(path) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping invalid precache path '{}': {}", path, e);
                    continue;
                }
            };
            let request = HttpRequest::get(url);
            match self.network.fetch(&request).await {
                Ok(response) if strategies::is_cacheable(&response) => {
                    strategies::store(
                        self.cache.as_ref(),
                        cache_names::APP_SHELL,
                        &request.cache_key(),
                        &response,
                    )
                    .await;
                    cached += 1;
                }
                Ok(response) => warn!(
                    "Failed to precache {}: status {}",
                    request.url, response.status
                ),
                Err(e) => warn!("Failed to precache {}: {}", request.url, e),
            }
        }
        info!("Precached {} of {} app-shell entries.", cached, self.precache_urls.len());
        cached
    }

    /// Deletes every cache that neither the router nor `also_keep` owns.
    pub async fn activate(&self, also_keep: &[&str]) -> PortResult<Vec<String>> {
        let mut removed = Vec::new();
        for name in self.cache.cache_names().await? {
            let owned = cache_names::ALL.contains(&name.as_str()) || also_keep.contains(&name.as_str());
            if !owned && self.cache.delete_cache(&name).await? {
                info!("Deleted stale cache '{}'.", name);
                removed.push(name);
            }
        }
        Ok(removed)
    }
}
