//! services/offline/src/lib.rs
//!
//! The offline data and synchronization layer for the story app: the cache
//! router, the bookmark repository, the pending-submission queue, and the
//! connectivity monitor, plus the SQLite/reqwest adapters and the HTTP gateway
//! that exposes them.

pub mod adapters;
pub mod bookmarks;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod queue;
pub mod router;
pub mod submit;
pub mod web;
