//! services/offline/src/web/proxy.rs
//!
//! The interception surface: every request that is not an `/_offline` endpoint
//! is converted into an `HttpRequest` and answered by the cache router.

use crate::web::state::AppState;
use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use story_offline_core::domain::{HttpRequest, HttpResponse};
use tracing::warn;
use url::Url;

/// Largest request body the gateway forwards.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// Connection-level headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// A page load is either announced by `Sec-Fetch-Mode: navigate` or looks like
/// one: a GET that accepts HTML.
pub fn is_navigation(method: &Method, headers: &axum::http::HeaderMap) -> bool {
    let fetch_mode = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok());
    if let Some(mode) = fetch_mode {
        return mode.eq_ignore_ascii_case("navigate");
    }
    method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}

/// Absolute-form targets are used as-is; origin-form targets are resolved
/// against the app origin.
pub fn resolve_target(uri: &axum::http::Uri, app_origin: &Url) -> Result<Url, url::ParseError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string());
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    app_origin.join(path_and_query)
}

fn into_axum_response(response: HttpResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            warn!("Failed to build proxied response: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        })
}

/// The fallback handler for everything outside `/_offline`.
pub async fn intercept_handler(State(app_state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, request_body) = request.into_parts();

    let url = match resolve_target(&parts.uri, &app_state.config.app_origin) {
        Ok(url) => url,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid request target: {}", e))
                .into_response()
        }
    };
    let body = match body::to_bytes(request_body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Failed to read request body: {}", e),
            )
                .into_response()
        }
    };

    let mut headers = BTreeMap::new();
    for (name, value) in &parts.headers {
        let name = name.as_str();
        if is_hop_by_hop(name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.insert(name.to_string(), value.to_string());
        }
    }

    let mut intercepted = HttpRequest::new(parts.method.as_str(), url).with_body(body);
    intercepted.headers = headers;
    if is_navigation(&parts.method, &parts.headers) {
        intercepted = intercepted.navigate();
    }

    into_axum_response(app_state.router.handle(intercepted).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Uri};

    #[test]
    fn test_navigation_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        assert!(is_navigation(&Method::GET, &headers));
        assert!(!is_navigation(&Method::POST, &headers));

        headers.insert("sec-fetch-mode", "cors".parse().unwrap());
        assert!(!is_navigation(&Method::GET, &headers));
    }

    #[test]
    fn test_resolve_target() {
        let app = Url::parse("https://app.example").unwrap();

        let origin_form: Uri = "/stories?page=2".parse().unwrap();
        assert_eq!(
            resolve_target(&origin_form, &app).unwrap().as_str(),
            "https://app.example/stories?page=2"
        );

        let absolute: Uri = "https://api.example/v1/stories/abc".parse().unwrap();
        assert_eq!(
            resolve_target(&absolute, &app).unwrap().as_str(),
            "https://api.example/v1/stories/abc"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_are_dropped() {
        let mut response = HttpResponse::text(200, "ok");
        response
            .headers
            .insert("transfer-encoding".to_string(), "chunked".to_string());
        let converted = into_axum_response(response);
        assert!(converted.headers().get("transfer-encoding").is_none());
        assert!(converted.headers().get("content-type").is_some());
    }
}
