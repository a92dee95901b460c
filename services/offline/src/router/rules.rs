//! services/offline/src/router/rules.rs
//!
//! Classifies intercepted requests into routing buckets. Rules are evaluated in
//! a fixed order and the first match wins.

use regex::Regex;
use story_offline_core::domain::{HttpRequest, RequestMode};
use url::{Origin, Url};

/// The routing bucket a request falls into, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Non-GET requests go straight to the network.
    NonGet,
    /// Login/register: network-only, never served from cache.
    Auth,
    /// `{api}/stories/{id}`: network-first, single placeholder fallback.
    StoryDetail,
    /// Any other `{api}` path containing `/stories`: network-first, list fallback.
    StoryCollection,
    /// png/jpg/jpeg/svg/gif/webp: cache-first.
    Image,
    /// js/css: stale-while-revalidate.
    StaticAsset,
    /// Configured font/CDN hosts: cache-first.
    ExtraCacheFirst,
    /// Top-level page loads on the app origin: network-first with the app's index as fallback.
    Navigation,
    /// Anything else on the app origin: cache-first.
    SameOrigin,
    /// Anything else: passed through uncached.
    CrossOrigin,
}

pub struct RouteTable {
    api_origin: Origin,
    api_prefix: String,
    app_origin: Origin,
    auth: Regex,
    detail: Regex,
    image: Regex,
    static_asset: Regex,
    extra_hosts: Vec<String>,
}

impl RouteTable {
    pub fn new(api_base: &Url, app_origin: &Url, extra_origins: &[String]) -> Result<Self, regex::Error> {
        let api_prefix = api_base.path().trim_end_matches('/').to_string();
        let escaped = regex::escape(&api_prefix);

        let extra_hosts = extra_origins
            .iter()
            .filter_map(|origin| {
                if origin.contains("://") {
                    Url::parse(origin).ok()?.host_str().map(str::to_string)
                } else {
                    Some(origin.trim().to_string())
                }
            })
            .collect();

        Ok(Self {
            api_origin: api_base.origin(),
            app_origin: app_origin.origin(),
            auth: Regex::new(&format!("^{}/(login|register)/?$", escaped))?,
            detail: Regex::new(&format!("^{}/stories/[^/]+$", escaped))?,
            image: Regex::new(r"(?i)\.(png|jpg|jpeg|svg|gif|webp)$")?,
            static_asset: Regex::new(r"(?i)\.(js|css)$")?,
            api_prefix,
            extra_hosts,
        })
    }

    fn is_api(&self, url: &Url) -> bool {
        url.origin() == self.api_origin
            && (url.path() == self.api_prefix
                || url.path().starts_with(&format!("{}/", self.api_prefix))
                || self.api_prefix.is_empty())
    }

    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.app_origin
    }

    pub fn classify(&self, request: &HttpRequest) -> RouteClass {
        if !request.is_get() {
            return RouteClass::NonGet;
        }

        let url = &request.url;
        let path = url.path();

        if self.is_api(url) {
            if self.auth.is_match(path) {
                return RouteClass::Auth;
            }
            if self.detail.is_match(path) {
                return RouteClass::StoryDetail;
            }
            if path.contains("/stories") {
                return RouteClass::StoryCollection;
            }
        }

        if self.image.is_match(path) {
            return RouteClass::Image;
        }
        if self.static_asset.is_match(path) {
            return RouteClass::StaticAsset;
        }
        if let Some(host) = url.host_str() {
            if self.extra_hosts.iter().any(|h| h == host) {
                return RouteClass::ExtraCacheFirst;
            }
        }
        if request.mode == RequestMode::Navigate && self.is_same_origin(url) {
            return RouteClass::Navigation;
        }
        if self.is_same_origin(url) {
            return RouteClass::SameOrigin;
        }
        RouteClass::CrossOrigin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(
            &Url::parse("https://story-api.example/v1").unwrap(),
            &Url::parse("https://app.example").unwrap(),
            &["https://fonts.gstatic.com".to_string(), "cdnjs.cloudflare.com".to_string()],
        )
        .unwrap()
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_classification_order() {
        let t = table();
        let cases = [
            ("https://story-api.example/v1/login", RouteClass::Auth),
            ("https://story-api.example/v1/register", RouteClass::Auth),
            ("https://story-api.example/v1/stories/abc-123", RouteClass::StoryDetail),
            ("https://story-api.example/v1/stories?page=1&size=10", RouteClass::StoryCollection),
            ("https://story-api.example/v1/stories/", RouteClass::StoryCollection),
            ("https://story-api.example/v1/stories/abc/comments", RouteClass::StoryCollection),
            ("https://story-api.example/images/photo.JPG", RouteClass::Image),
            ("https://app.example/app.bundle.js", RouteClass::StaticAsset),
            ("https://app.example/app.css", RouteClass::StaticAsset),
            ("https://fonts.gstatic.com/s/roboto.woff2", RouteClass::ExtraCacheFirst),
            ("https://app.example/manifest.json", RouteClass::SameOrigin),
            ("https://analytics.example/collect", RouteClass::CrossOrigin),
        ];
        for (url, expected) in cases {
            assert_eq!(t.classify(&get(url)), expected, "{}", url);
        }
    }

    #[test]
    fn test_non_get_wins_over_everything() {
        let t = table();
        let request = HttpRequest::new("POST", Url::parse("https://story-api.example/v1/login").unwrap());
        assert_eq!(t.classify(&request), RouteClass::NonGet);
    }

    #[test]
    fn test_navigation_and_foreign_stories_paths() {
        let t = table();
        assert_eq!(
            t.classify(&get("https://app.example/#/about").navigate()),
            RouteClass::Navigation
        );
        assert_eq!(
            t.classify(&get("https://elsewhere.example/").navigate()),
            RouteClass::CrossOrigin
        );
        // A `/stories` path outside the API base is not an API route.
        assert_eq!(
            t.classify(&get("https://elsewhere.example/v1/stories/1")),
            RouteClass::CrossOrigin
        );
    }
}
