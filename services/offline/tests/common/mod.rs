#![allow(dead_code)]

use async_trait::async_trait;
use offline_lib::adapters::{connect_pool, SqliteHttpCache};
use offline_lib::config::Config;
use offline_lib::queue::FlushTrigger;
use offline_lib::router::cache_policies;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use story_offline_core::domain::{HttpRequest, HttpResponse, Notice};
use story_offline_core::ports::{NetworkClient, Notifier, PortError, PortResult};

pub const API_BASE: &str = "https://story-api.example/v1";
pub const APP_ORIGIN: &str = "https://app.example";

pub fn test_config() -> Config {
    Config::for_tests(API_BASE, APP_ORIGIN).expect("test config")
}

pub async fn memory_cache() -> Arc<SqliteHttpCache> {
    let pool = connect_pool("sqlite::memory:").await.expect("in-memory sqlite");
    let cache = cache_policies()
        .into_iter()
        .fold(SqliteHttpCache::new(pool), |cache, (name, policy)| {
            cache.with_policy(name, policy)
        });
    Arc::new(cache)
}

type Handler = Box<dyn Fn(&HttpRequest) -> PortResult<HttpResponse> + Send + Sync>;

/// An in-process upstream. Every call is recorded; while "offline" every call
/// fails with a connectivity error, otherwise the current handler answers.
pub struct ScriptedNetwork {
    online: AtomicBool,
    delay: Mutex<Option<Duration>>,
    handler: Mutex<Handler>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedNetwork {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> PortResult<HttpResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            online: AtomicBool::new(true),
            delay: Mutex::new(None),
            handler: Mutex::new(Box::new(handler)),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `200 OK` and the given body.
    pub fn always_ok(body: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok(HttpResponse::text(200, body)))
    }

    pub fn offline() -> Arc<Self> {
        let network = Self::always_ok("unreachable");
        network.set_online(false);
        network
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&HttpRequest) -> PortResult<HttpResponse> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Box::new(handler);
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NetworkClient for ScriptedNetwork {
    async fn fetch(&self, request: &HttpRequest) -> PortResult<HttpResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(PortError::Connectivity("scripted network is offline".to_string()));
        }
        (self.handler.lock().unwrap())(request)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Counts flush triggers instead of flushing.
#[derive(Default)]
pub struct CountingFlush {
    triggers: AtomicUsize,
}

impl CountingFlush {
    pub fn count(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlushTrigger for CountingFlush {
    async fn trigger_flush(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }
}
