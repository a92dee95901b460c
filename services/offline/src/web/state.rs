//! services/offline/src/web/state.rs
//!
//! Defines the application state shared by every gateway handler.

use crate::adapters::WatchConnectivity;
use crate::bookmarks::BookmarkRepository;
use crate::config::Config;
use crate::context::OfflineContext;
use crate::queue::PendingSubmissionQueue;
use crate::router::CacheRouter;
use crate::submit::StorySubmitter;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<CacheRouter>,
    pub bookmarks: Arc<BookmarkRepository>,
    pub queue: PendingSubmissionQueue,
    pub submitter: Arc<StorySubmitter>,
    pub connectivity: Arc<WatchConnectivity>,
}

impl AppState {
    pub fn from_context(context: &OfflineContext) -> Self {
        Self {
            config: Arc::new(context.config.clone()),
            router: Arc::clone(&context.router),
            bookmarks: Arc::clone(&context.bookmarks),
            queue: context.queue.clone(),
            submitter: Arc::clone(&context.submitter),
            connectivity: Arc::clone(&context.connectivity),
        }
    }
}
