//! services/offline/src/submit.rs
//!
//! Story submission. A submission is validated, sent upstream, and handed to the
//! pending-submission queue when (and only when) the network is unreachable.

use std::sync::Arc;
use story_offline_core::domain::{FormField, HttpRequest, SubmissionPayload, SubmissionReceipt};
use story_offline_core::ports::{NetworkClient, PortError, PortResult};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::queue::PendingSubmissionQueue;

/// Largest photo the upstream API accepts.
pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;

fn photo_file_name(content_type: &str) -> String {
    let extension = content_type
        .split(';')
        .next()
        .and_then(|mime| mime.trim().strip_prefix("image/"))
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or("bin");
    format!("photo.{}", extension)
}

/// Builds the upstream multipart request for a submission. Used for the first
/// attempt and for every replay.
pub fn submission_request(url: &Url, payload: &SubmissionPayload) -> HttpRequest {
    let mut form = vec![
        FormField::text("description", payload.description.clone()),
        FormField::File {
            name: "photo".to_string(),
            file_name: photo_file_name(&payload.photo_content_type),
            content_type: payload.photo_content_type.clone(),
            bytes: payload.photo.clone(),
        },
    ];
    if let (Some(lat), Some(lon)) = (payload.lat, payload.lon) {
        form.push(FormField::text("lat", lat.to_string()));
        form.push(FormField::text("lon", lon.to_string()));
    }

    HttpRequest::post_form(url.clone(), form)
        .with_header("authorization", &format!("Bearer {}", payload.token))
}

pub fn validate(payload: &SubmissionPayload) -> PortResult<()> {
    if payload.token.trim().is_empty() {
        return Err(PortError::AuthRequired(
            "Log in before sharing a story".to_string(),
        ));
    }
    if payload.description.trim().is_empty() {
        return Err(PortError::Validation("A description is required".to_string()));
    }
    if payload.photo.is_empty() {
        return Err(PortError::Validation("A photo is required".to_string()));
    }
    if payload.photo.len() > MAX_PHOTO_BYTES {
        return Err(PortError::Validation(format!(
            "The photo is {} bytes; the limit is {} bytes",
            payload.photo.len(),
            MAX_PHOTO_BYTES
        )));
    }
    Ok(())
}

pub struct StorySubmitter {
    network: Arc<dyn NetworkClient>,
    queue: PendingSubmissionQueue,
    submit_url: Url,
}

impl StorySubmitter {
    pub fn new(network: Arc<dyn NetworkClient>, queue: PendingSubmissionQueue, submit_url: Url) -> Self {
        Self {
            network,
            queue,
            submit_url,
        }
    }

    /// Submits a story. A connectivity failure is not an error for the caller:
    /// the story is queued and a queued receipt is returned.
    pub async fn submit(&self, payload: SubmissionPayload) -> PortResult<SubmissionReceipt> {
        validate(&payload)?;

        let request = submission_request(&self.submit_url, &payload);
        let response = match self.network.fetch(&request).await {
            Ok(response) => response,
            Err(e) if e.is_connectivity() => {
                warn!("Network unavailable, queueing story for later: {}", e);
                return self.queue.enqueue(payload).await;
            }
            Err(e) => return Err(e),
        };

        let message = response
            .body_json()
            .and_then(|body| body["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| format!("Upstream answered with status {}", response.status));

        match response.status {
            200..=299 => {
                info!("Story submitted.");
                Ok(SubmissionReceipt {
                    local_id: Uuid::new_v4(),
                    queued: false,
                    queue_key: None,
                    message,
                })
            }
            401 => Err(PortError::AuthRequired(message)),
            400 | 413 => Err(PortError::Validation(message)),
            _ => Err(PortError::Unexpected(message)),
        }
    }
}
