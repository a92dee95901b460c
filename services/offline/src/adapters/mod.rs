pub mod connectivity;
pub mod http_cache;
pub mod kv_store;
pub mod network;
pub mod notifier;

pub use connectivity::{ConnectivityProbe, WatchConnectivity};
pub use http_cache::{CachePolicy, SqliteHttpCache};
pub use kv_store::{IndexSpec, SqliteKeyValueStore, StoreSchema};
pub use network::ReqwestNetworkClient;
pub use notifier::TracingNotifier;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Opens the SQLite pool shared by the key-value store and the HTTP cache.
///
/// An in-memory database lives only as long as its connection, so it is pinned
/// to a single connection that never idles out.
pub async fn connect_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
    }
}
