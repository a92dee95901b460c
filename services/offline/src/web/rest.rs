//! services/offline/src/web/rest.rs
//!
//! Contains the Axum handlers for the `/_offline` REST endpoints and the master
//! definition for the OpenAPI specification.

use crate::queue::FlushTrigger;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use story_offline_core::domain::{
    Bookmark, Connectivity, PendingSubmission, Story, SubmissionPayload, SubmissionReceipt,
};
use story_offline_core::ports::{ConnectivitySource, PortError};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_bookmarks_handler,
        add_bookmark_handler,
        clear_bookmarks_handler,
        count_bookmarks_handler,
        get_bookmark_handler,
        remove_bookmark_handler,
        submit_story_handler,
        list_pending_handler,
        flush_handler,
        get_connectivity_handler,
        set_connectivity_handler,
    ),
    components(
        schemas(
            StoryBody,
            BookmarkResponse,
            CountResponse,
            SubmitStoryRequest,
            ReceiptResponse,
            PendingSubmissionResponse,
            FlushAccepted,
            ConnectivityBody,
        )
    ),
    tags(
        (name = "Offline Story API", description = "Bookmarks, queued submissions and connectivity of the offline layer.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A story as sent by the client when bookmarking it.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoryBody {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub created_at: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl From<StoryBody> for Story {
    fn from(body: StoryBody) -> Self {
        Story {
            id: body.id,
            name: body.name,
            description: body.description,
            photo_url: body.photo_url,
            created_at: body.created_at,
            lat: body.lat,
            lon: body.lon,
        }
        .normalized()
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub photo_url: String,
    pub created_at: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub bookmarked_at: DateTime<Utc>,
}

impl From<Bookmark> for BookmarkResponse {
    fn from(bookmark: Bookmark) -> Self {
        let story = bookmark.story;
        Self {
            id: story.id,
            name: story.name,
            description: story.description,
            photo_url: story.photo_url,
            created_at: story.created_at,
            lat: story.lat,
            lon: story.lon,
            bookmarked_at: bookmark.bookmarked_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: u64,
}

/// A new story. The bearer token comes from the `Authorization` header.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStoryRequest {
    pub description: String,
    /// Base64-encoded image bytes.
    pub photo: String,
    pub photo_content_type: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub local_id: Uuid,
    pub queued: bool,
    pub queue_key: Option<String>,
    pub message: String,
}

impl From<SubmissionReceipt> for ReceiptResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        Self {
            local_id: receipt.local_id,
            queued: receipt.queued,
            queue_key: receipt.queue_key,
            message: receipt.message,
        }
    }
}

/// A queued submission, without its photo bytes or token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingSubmissionResponse {
    pub key: String,
    pub created_at: i64,
    pub description: String,
    pub photo_bytes: usize,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl From<PendingSubmission> for PendingSubmissionResponse {
    fn from(entry: PendingSubmission) -> Self {
        Self {
            key: entry.key,
            created_at: entry.created_at,
            description: entry.payload.description,
            photo_bytes: entry.payload.photo.len(),
            lat: entry.payload.lat,
            lon: entry.payload.lon,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlushAccepted {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectivityBody {
    pub online: bool,
}

/// Maps a port error onto the status code a client should see.
fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Connectivity(_) | PortError::StorageUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .unwrap_or_default()
}

//=========================================================================================
// Bookmark Handlers
//=========================================================================================

/// List bookmarks, most recently bookmarked first.
#[utoipa::path(
    get,
    path = "/_offline/bookmarks",
    responses((status = 200, description = "All bookmarks", body = [BookmarkResponse]))
)]
pub async fn list_bookmarks_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let bookmarks: Vec<BookmarkResponse> = app_state
        .bookmarks
        .list()
        .await
        .into_iter()
        .map(BookmarkResponse::from)
        .collect();
    Json(bookmarks)
}

/// Bookmark a story, replacing any earlier bookmark of the same story.
#[utoipa::path(
    post,
    path = "/_offline/bookmarks",
    request_body = StoryBody,
    responses(
        (status = 201, description = "Story bookmarked", body = BookmarkResponse),
        (status = 400, description = "The story has no id"),
        (status = 503, description = "Local storage unavailable")
    )
)]
pub async fn add_bookmark_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<StoryBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = Story::from(body);
    let bookmark = app_state
        .bookmarks
        .add(&story)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(BookmarkResponse::from(bookmark))))
}

/// Remove every bookmark.
#[utoipa::path(
    delete,
    path = "/_offline/bookmarks",
    responses(
        (status = 204, description = "All bookmarks removed"),
        (status = 503, description = "Local storage unavailable")
    )
)]
pub async fn clear_bookmarks_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, String)> {
    app_state
        .bookmarks
        .clear()
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/_offline/bookmarks/count",
    responses((status = 200, description = "Number of bookmarks", body = CountResponse))
)]
pub async fn count_bookmarks_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(CountResponse {
        count: app_state.bookmarks.count().await,
    })
}

#[utoipa::path(
    get,
    path = "/_offline/bookmarks/{id}",
    params(("id" = String, Path, description = "The story id.")),
    responses(
        (status = 200, description = "The bookmark", body = BookmarkResponse),
        (status = 404, description = "The story is not bookmarked")
    )
)]
pub async fn get_bookmark_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match app_state.bookmarks.get(&id).await {
        Some(bookmark) => Ok(Json(BookmarkResponse::from(bookmark))),
        None => Err(port_error_response(PortError::NotFound(format!(
            "Story {} is not bookmarked",
            id
        )))),
    }
}

/// Remove one bookmark. Removing a story that is not bookmarked succeeds.
#[utoipa::path(
    delete,
    path = "/_offline/bookmarks/{id}",
    params(("id" = String, Path, description = "The story id.")),
    responses(
        (status = 204, description = "Bookmark removed"),
        (status = 503, description = "Local storage unavailable")
    )
)]
pub async fn remove_bookmark_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    app_state
        .bookmarks
        .remove(&id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Submission Handlers
//=========================================================================================

/// Share a new story.
///
/// When the upstream API is unreachable the story is stored locally and sent
/// later; the response is then `202 Accepted` with `queued: true`.
#[utoipa::path(
    post,
    path = "/_offline/submissions",
    request_body = SubmitStoryRequest,
    responses(
        (status = 201, description = "Story delivered upstream", body = ReceiptResponse),
        (status = 202, description = "Story stored offline for later delivery", body = ReceiptResponse),
        (status = 400, description = "Invalid story"),
        (status = 401, description = "Missing or rejected bearer token")
    ),
    params(
        ("Authorization" = String, Header, description = "`Bearer <token>` for the upstream API.")
    )
)]
pub async fn submit_story_handler(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitStoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let photo = STANDARD.decode(body.photo.as_bytes()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("The photo is not valid base64: {}", e),
        )
    })?;

    let payload = SubmissionPayload {
        description: body.description,
        photo: Bytes::from(photo),
        photo_content_type: body
            .photo_content_type
            .unwrap_or_else(|| "image/jpeg".to_string()),
        lat: body.lat,
        lon: body.lon,
        token: bearer_token(&headers),
    };

    let receipt = app_state.submitter.submit(payload).await.map_err(|e| {
        error!("Story submission failed: {}", e);
        port_error_response(e)
    })?;

    let status = if receipt.queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ReceiptResponse::from(receipt))))
}

/// List submissions waiting for connectivity, oldest first.
#[utoipa::path(
    get,
    path = "/_offline/submissions",
    responses(
        (status = 200, description = "Queued submissions", body = [PendingSubmissionResponse]),
        (status = 503, description = "Local storage unavailable")
    )
)]
pub async fn list_pending_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pending: Vec<PendingSubmissionResponse> = app_state
        .queue
        .pending()
        .await
        .map_err(port_error_response)?
        .into_iter()
        .map(PendingSubmissionResponse::from)
        .collect();
    Ok(Json(pending))
}

/// Ask the queue to replay its submissions. Returns without waiting.
#[utoipa::path(
    post,
    path = "/_offline/submissions/flush",
    responses((status = 202, description = "Flush scheduled", body = FlushAccepted))
)]
pub async fn flush_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    app_state.queue.trigger_flush().await;
    (
        StatusCode::ACCEPTED,
        Json(FlushAccepted {
            message: "Flush scheduled".to_string(),
        }),
    )
}

//=========================================================================================
// Connectivity Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/_offline/connectivity",
    responses((status = 200, description = "Current connectivity", body = ConnectivityBody))
)]
pub async fn get_connectivity_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ConnectivityBody {
        online: app_state.connectivity.current().is_online(),
    })
}

/// Report a connectivity change, as a platform online/offline event would.
#[utoipa::path(
    put,
    path = "/_offline/connectivity",
    request_body = ConnectivityBody,
    responses((status = 200, description = "Connectivity after the update", body = ConnectivityBody))
)]
pub async fn set_connectivity_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<ConnectivityBody>,
) -> impl IntoResponse {
    let reported = Connectivity::from_online(body.online);
    if app_state.connectivity.set(reported) {
        info!("Connectivity reported as {:?}.", reported);
    }
    Json(ConnectivityBody {
        online: app_state.connectivity.current().is_online(),
    })
}
