//! crates/story_offline_core/src/domain.rs
//!
//! Defines the pure, core data structures for the offline layer.
//! These structs are independent of any database or transport implementation.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

//=========================================================================================
// Stories and Bookmarks
//=========================================================================================

/// A user-submitted post, as served by the upstream story API.
///
/// Coordinates are all-or-nothing: a story with only one of `lat`/`lon`, or with a
/// non-finite value, is treated as having no location at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawStory")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo_url: String,
    pub created_at: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

// Wire shape before coordinate normalization.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStory {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    photo_url: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

impl From<RawStory> for Story {
    fn from(raw: RawStory) -> Self {
        let (lat, lon) = normalize_coordinates(raw.lat, raw.lon);
        Story {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            photo_url: raw.photo_url,
            created_at: raw.created_at,
            lat,
            lon,
        }
    }
}

impl Story {
    /// Returns the location only when both coordinates are present and usable.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
            _ => None,
        }
    }

    /// Returns a copy with partial coordinates dropped.
    pub fn normalized(mut self) -> Self {
        let (lat, lon) = normalize_coordinates(self.lat, self.lon);
        self.lat = lat;
        self.lon = lon;
        self
    }
}

fn normalize_coordinates(lat: Option<f64>, lon: Option<f64>) -> (Option<f64>, Option<f64>) {
    match (lat, lon) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => (Some(lat), Some(lon)),
        _ => (None, None),
    }
}

/// A locally persisted reference to a story, keyed by the story id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(flatten)]
    pub story: Story,
    pub bookmarked_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn from_story(story: &Story, bookmarked_at: DateTime<Utc>) -> Self {
        Self {
            story: story.clone().normalized(),
            bookmarked_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.story.id
    }
}

//=========================================================================================
// HTTP-like Requests and Responses
//=========================================================================================

/// How a request was issued by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// A top-level page load.
    Navigate,
    /// Anything else: API calls, images, scripts.
    Subresource,
}

/// One field of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        bytes: Bytes,
    },
}

impl FormField {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        FormField::Text {
            name: name.to_string(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormField::Text { name, .. } | FormField::File { name, .. } => name,
        }
    }
}

/// An outbound request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Upper-case method name.
    pub method: String,
    pub url: Url,
    /// Header names are stored lower-case.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// When non-empty, the request is sent as multipart/form-data and `body` is ignored.
    pub form: Vec<FormField>,
    pub mode: RequestMode,
}

impl HttpRequest {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: BTreeMap::new(),
            body: Bytes::new(),
            form: Vec::new(),
            mode: RequestMode::Subresource,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn head(url: Url) -> Self {
        Self::new("HEAD", url)
    }

    pub fn post_json(url: Url, body: &serde_json::Value) -> Self {
        Self::new("POST", url)
            .with_header("content-type", "application/json")
            .with_body(Bytes::from(body.to_string()))
    }

    pub fn post_form(url: Url, form: Vec<FormField>) -> Self {
        let mut request = Self::new("POST", url);
        request.form = form;
        request
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn form_field(&self, name: &str) -> Option<&FormField> {
        self.form.iter().find(|field| field.name() == name)
    }

    pub fn form_text(&self, name: &str) -> Option<&str> {
        match self.form_field(name)? {
            FormField::Text { value, .. } => Some(value),
            FormField::File { .. } => None,
        }
    }

    /// The normalized identity used to key cache entries: method plus the URL
    /// without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

/// A response handed back to the interception layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: Bytes) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, Bytes::from(value.to_string()));
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn text(status: u16, text: &str) -> Self {
        let mut response = Self::new(status, Bytes::from(text.to_string()));
        response
            .headers
            .insert("content-type".to_string(), "text/plain; charset=utf-8".to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// An entry in a named HTTP cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_response(response: &HttpResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at,
        }
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

//=========================================================================================
// Offline Submissions
//=========================================================================================

/// The form fields of a story submission. The token is carried opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPayload {
    pub description: String,
    pub photo: Bytes,
    pub photo_content_type: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub token: String,
}

/// A submission persisted while the network was unreachable.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub key: String,
    /// Monotonic millisecond stamp; doubles as insertion order.
    pub created_at: i64,
    pub payload: SubmissionPayload,
}

/// Acknowledgment returned to the caller of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub local_id: Uuid,
    /// True when delivery was deferred until connectivity returns.
    pub queued: bool,
    pub queue_key: Option<String>,
    pub message: String,
}

//=========================================================================================
// Connectivity and Notices
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == Connectivity::Online
    }
}

/// A transient, user-facing message. The exact wording is up to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    WentOffline,
    BackOnline,
    SubmissionStoredOffline { key: String },
    SubmissionsSynced { delivered: usize, retained: usize },
}
