//! services/offline/src/context.rs
//!
//! Wires adapters and components together and owns the background tasks.
//! Everything is constructed here and passed down explicitly.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use story_offline_core::domain::Connectivity;
use story_offline_core::ports::{HttpCache, KeyValueStore, NetworkClient, Notifier};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{
    connect_pool, ConnectivityProbe, ReqwestNetworkClient, SqliteHttpCache, SqliteKeyValueStore,
    TracingNotifier, WatchConnectivity,
};
use crate::bookmarks::{bookmark_schema, BookmarkRepository};
use crate::config::{Config, ConfigError};
use crate::connectivity::ConnectivityMonitor;
use crate::error::ServiceResult;
use crate::queue::{PendingSubmissionQueue, OFFLINE_FORMS_CACHE};
use crate::router::{cache_policies, CacheRouter};
use crate::submit::StorySubmitter;

/// Upper bound for a single upstream exchange. Strategies race their own,
/// shorter timeouts on top of this.
const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The concrete implementations the components run on.
pub struct Adapters {
    pub store: Arc<dyn KeyValueStore>,
    pub cache: Arc<dyn HttpCache>,
    pub network: Arc<dyn NetworkClient>,
    pub notifier: Arc<dyn Notifier>,
    pub connectivity: Arc<WatchConnectivity>,
}

pub struct OfflineContext {
    pub config: Config,
    pub bookmarks: Arc<BookmarkRepository>,
    pub router: Arc<CacheRouter>,
    pub queue: PendingSubmissionQueue,
    pub submitter: Arc<StorySubmitter>,
    pub connectivity: Arc<WatchConnectivity>,
    store: Arc<dyn KeyValueStore>,
    cache: Arc<dyn HttpCache>,
    network: Arc<dyn NetworkClient>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineContext {
    /// Opens the database named by the config, builds the production adapters,
    /// and prepares every store and cache.
    pub async fn init(config: Config) -> ServiceResult<Self> {
        let pool = connect_pool(&config.database_url).await?;

        let store = SqliteKeyValueStore::new(pool.clone(), vec![bookmark_schema()])?;
        let cache = cache_policies()
            .into_iter()
            .fold(SqliteHttpCache::new(pool), |cache, (name, policy)| {
                cache.with_policy(name, policy)
            });
        let network = ReqwestNetworkClient::new(UPSTREAM_REQUEST_TIMEOUT)?;

        let adapters = Adapters {
            store: Arc::new(store),
            cache: Arc::new(cache),
            network: Arc::new(network),
            notifier: Arc::new(TracingNotifier),
            // Assumed online until the first probe says otherwise.
            connectivity: Arc::new(WatchConnectivity::new(Connectivity::Online)),
        };

        let context = Self::with_adapters(config, adapters)?;
        context.prepare().await?;
        Ok(context)
    }

    /// Builds the components on top of caller-supplied adapters. Does no I/O.
    pub fn with_adapters(config: Config, adapters: Adapters) -> ServiceResult<Self> {
        let submit_url = config.api_endpoint("stories").map_err(|e| {
            ConfigError::InvalidValue("API_BASE_URL".to_string(), e.to_string())
        })?;

        let router = CacheRouter::new(
            Arc::clone(&adapters.cache),
            Arc::clone(&adapters.network),
            &config,
        )?;
        let queue = PendingSubmissionQueue::new(
            Arc::clone(&adapters.cache),
            Arc::clone(&adapters.network),
            Arc::clone(&adapters.notifier),
            submit_url.clone(),
        );
        let submitter = StorySubmitter::new(Arc::clone(&adapters.network), queue.clone(), submit_url);

        Ok(Self {
            bookmarks: Arc::new(BookmarkRepository::new(Arc::clone(&adapters.store))),
            router: Arc::new(router),
            queue,
            submitter: Arc::new(submitter),
            connectivity: adapters.connectivity,
            store: adapters.store,
            cache: adapters.cache,
            network: adapters.network,
            notifier: adapters.notifier,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Schema setup, app-shell precache, and removal of caches nobody owns.
    pub async fn prepare(&self) -> ServiceResult<()> {
        self.store.open().await?;
        self.cache.open(OFFLINE_FORMS_CACHE).await?;

        self.router.install().await;
        let removed = self.router.activate(&[OFFLINE_FORMS_CACHE]).await?;
        if !removed.is_empty() {
            info!("Removed {} stale caches.", removed.len());
        }
        Ok(())
    }

    /// Spawns the connectivity monitor and, when configured, the reachability probe.
    pub fn start(&self) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tasks.is_empty() {
            warn!("Background tasks are already running.");
            return;
        }

        let monitor = ConnectivityMonitor::new(
            self.connectivity.as_ref(),
            Arc::new(self.queue.clone()),
            Arc::clone(&self.notifier),
            self.config.flush_debounce,
            self.config.periodic_flush,
        );
        tasks.push(tokio::spawn(monitor.run(self.cancel.child_token())));

        if let Some(interval) = self.config.probe_interval {
            let probe = ConnectivityProbe::new(
                Arc::clone(&self.network),
                self.config.api_base_url.clone(),
                Arc::clone(&self.connectivity),
                interval,
                self.config.network_timeout,
            );
            tasks.push(tokio::spawn(probe.run(self.cancel.child_token())));
        }

        info!("Started {} background tasks.", tasks.len());
    }

    /// Cancels the background tasks and waits for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Offline context shut down.");
    }
}
