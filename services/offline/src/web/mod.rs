pub mod proxy;
pub mod rest;
pub mod state;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

pub use proxy::intercept_handler;
use rest::{
    add_bookmark_handler, clear_bookmarks_handler, count_bookmarks_handler, flush_handler,
    get_bookmark_handler, get_connectivity_handler, list_bookmarks_handler, list_pending_handler,
    remove_bookmark_handler, set_connectivity_handler, submit_story_handler,
};
use state::AppState;

/// The `/_offline` REST endpoints plus the intercepting fallback.
pub fn app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/_offline/bookmarks",
            get(list_bookmarks_handler)
                .post(add_bookmark_handler)
                .delete(clear_bookmarks_handler),
        )
        .route("/_offline/bookmarks/count", get(count_bookmarks_handler))
        .route(
            "/_offline/bookmarks/{id}",
            get(get_bookmark_handler).delete(remove_bookmark_handler),
        )
        .route(
            "/_offline/submissions",
            get(list_pending_handler).post(submit_story_handler),
        )
        .route("/_offline/submissions/flush", post(flush_handler))
        .route(
            "/_offline/connectivity",
            get(get_connectivity_handler).put(set_connectivity_handler),
        )
        .fallback(intercept_handler)
        .with_state(app_state)
}
