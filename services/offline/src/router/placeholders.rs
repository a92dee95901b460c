//! services/offline/src/router/placeholders.rs
//!
//! Synthetic story payloads served when both the network and the cache miss.
//! They are shaped like the upstream API's envelopes so callers can render them
//! without special cases.

use chrono::Utc;
use serde_json::json;
use story_offline_core::domain::{HttpResponse, Story};

const MAX_PLACEHOLDERS: usize = 3;

/// Builds offline placeholder responses for the story endpoints.
#[derive(Debug, Clone)]
pub struct Placeholders {
    count: usize,
}

impl Placeholders {
    /// `count` is how many stories the collection fallback contains, clamped to 1..=3.
    pub fn new(count: usize) -> Self {
        Self {
            count: count.clamp(1, MAX_PLACEHOLDERS),
        }
    }

    pub fn stories(&self) -> Vec<Story> {
        let now = Utc::now().to_rfc3339();
        let seeds = [
            (
                "offline-1",
                "Offline Story",
                "This story is available offline. Stories you viewed earlier stay readable without a connection.",
                "/favicon-192.png",
                -6.2088,
                106.8456,
            ),
            (
                "offline-2",
                "Story Demo",
                "A demo story for offline mode. Every feature of the app keeps working.",
                "/favicon-512.png",
                -6.1751,
                106.865,
            ),
            (
                "offline-3",
                "Offline Content",
                "Offline content keeps the app usable while there is no internet connection.",
                "/favicon.png",
                -6.2615,
                106.781,
            ),
        ];

        seeds
            .iter()
            .take(self.count)
            .map(|(id, name, description, photo, lat, lon)| Story {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                photo_url: photo.to_string(),
                created_at: now.clone(),
                lat: Some(*lat),
                lon: Some(*lon),
            })
            .collect()
    }

    /// `{error:false, message, listStory:[...]}`
    pub fn story_list(&self) -> HttpResponse {
        HttpResponse::json(
            200,
            &json!({
                "error": false,
                "message": "success",
                "listStory": self.stories(),
            }),
        )
    }

    /// `{error:false, message, story}`. A known placeholder id maps to itself;
    /// any other id gets the first placeholder.
    pub fn story_detail(&self, id: &str) -> HttpResponse {
        let mut stories = self.stories();
        let index = stories.iter().position(|s| s.id == id).unwrap_or(0);
        let story = stories.swap_remove(index);
        HttpResponse::json(
            200,
            &json!({
                "error": false,
                "message": "success",
                "story": story,
            }),
        )
    }
}
