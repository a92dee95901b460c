mod common;

use common::{memory_cache, test_config, ScriptedNetwork, API_BASE, APP_ORIGIN};
use offline_lib::router::{cache_names, CacheRouter};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use story_offline_core::domain::{CachedResponse, HttpRequest, HttpResponse};
use story_offline_core::ports::HttpCache;
use url::Url;

fn get(url: &str) -> HttpRequest {
    HttpRequest::get(Url::parse(url).unwrap())
}

fn story_url(path: &str) -> String {
    format!("{}{}", API_BASE, path)
}

#[tokio::test]
async fn test_detail_offline_without_cache_serves_placeholder() {
    let cache = memory_cache().await;
    let router = CacheRouter::new(cache, ScriptedNetwork::offline(), &test_config()).unwrap();

    let response = router.handle(get(&story_url("/stories/abc"))).await;
    assert_eq!(response.status, 200);
    let body = response.body_json().unwrap();
    assert_eq!(body["error"], false);
    assert_eq!(body["story"]["id"], "offline-1");
}

#[tokio::test]
async fn test_detail_offline_with_cache_serves_cached_body_verbatim() {
    let cache = memory_cache().await;
    let upstream = json!({"error": false, "message": "Story fetched successfully", "story": {"id": "abc"}});
    let body = upstream.clone();
    let network = ScriptedNetwork::new(move |_| Ok(HttpResponse::json(200, &body)));
    let router = CacheRouter::new(cache, network.clone(), &test_config()).unwrap();

    let online = router.handle(get(&story_url("/stories/abc"))).await;
    network.set_online(false);
    let offline = router.handle(get(&story_url("/stories/abc"))).await;

    assert_eq!(offline.status, 200);
    assert_eq!(offline.body, online.body);
    assert_eq!(offline.body_json().unwrap(), upstream);
}

#[tokio::test]
async fn test_collection_falls_back_to_cache_then_placeholders() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::new(|_| {
        Ok(HttpResponse::json(200, &json!({"error": false, "listStory": [{"id": "real"}]})))
    });
    let router = CacheRouter::new(cache, network.clone(), &test_config()).unwrap();
    network.set_online(false);

    // Nothing cached yet: placeholders.
    let placeholder = router.handle(get(&story_url("/stories?page=1"))).await;
    let list = placeholder.body_json().unwrap();
    assert_eq!(list["listStory"].as_array().unwrap().len(), 3);

    network.set_online(true);
    router.handle(get(&story_url("/stories?page=1"))).await;
    network.set_online(false);

    let cached = router.handle(get(&story_url("/stories?page=1"))).await;
    assert_eq!(cached.body_json().unwrap()["listStory"][0]["id"], "real");
}

#[tokio::test]
async fn test_image_is_served_from_cache_without_network() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::always_ok("png-bytes");
    let router = CacheRouter::new(cache, network.clone(), &test_config()).unwrap();
    let url = "https://story-api.example/images/stories/photo-1.png";

    let first = router.handle(get(url)).await;
    assert_eq!(network.call_count(), 1);

    network.set_online(false);
    let second = router.handle(get(url)).await;
    assert_eq!(network.call_count(), 1);
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn test_auth_endpoints_are_never_cached() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::new(|_| {
        Ok(HttpResponse::json(200, &json!({"error": false, "loginResult": {"token": "t"}})))
    });
    let router = CacheRouter::new(cache.clone(), network.clone(), &test_config()).unwrap();

    let online = router.handle(get(&story_url("/login"))).await;
    assert_eq!(online.status, 200);

    network.set_online(false);
    let offline = router.handle(get(&story_url("/login"))).await;
    assert_eq!(offline.status, 503);
    assert_eq!(
        offline.body_json().unwrap(),
        json!({"error": true, "message": "Authentication requires internet connection"})
    );

    for name in cache.cache_names().await.unwrap() {
        assert!(cache.keys(&name).await.unwrap().is_empty(), "cache {} is not empty", name);
    }
}

#[tokio::test]
async fn test_non_get_offline_gets_json_error() {
    let cache = memory_cache().await;
    let router = CacheRouter::new(cache, ScriptedNetwork::offline(), &test_config()).unwrap();

    let request = HttpRequest::post_json(Url::parse(&story_url("/stories")).unwrap(), &json!({}));
    let response = router.handle(request).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.body_json().unwrap()["error"], true);
}

#[tokio::test]
async fn test_stale_while_revalidate_serves_stale_then_fresh() {
    let cache = memory_cache().await;
    let url = format!("{}/app.bundle.js", APP_ORIGIN);
    let request = get(&url);
    cache
        .put(
            cache_names::STATIC_RESOURCES,
            &request.cache_key(),
            CachedResponse::from_response(&HttpResponse::text(200, "old"), chrono::Utc::now()),
        )
        .await
        .unwrap();

    let network = ScriptedNetwork::always_ok("new");
    let router = CacheRouter::new(cache.clone(), network.clone(), &test_config()).unwrap();

    let first = router.handle(get(&url)).await;
    assert_eq!(&first.body[..], b"old");

    // Wait for the background refresh to land.
    let mut refreshed = false;
    for _ in 0..50 {
        let entry = cache
            .lookup(cache_names::STATIC_RESOURCES, &request.cache_key())
            .await
            .unwrap()
            .unwrap();
        if &entry.body[..] == b"new" {
            refreshed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(refreshed);

    let second = router.handle(get(&url)).await;
    assert_eq!(&second.body[..], b"new");
    assert!(network.call_count() >= 1);
}

#[tokio::test]
async fn test_late_network_response_does_not_populate_cache() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::new(|_| {
        Ok(HttpResponse::json(200, &json!({"error": false, "story": {"id": "slow"}})))
    });
    network.set_delay(Duration::from_millis(300));
    let mut config = test_config();
    config.network_timeout = Duration::from_millis(50);
    let router = CacheRouter::new(cache.clone(), network.clone(), &config).unwrap();

    let response = router.handle(get(&story_url("/stories/slow"))).await;
    assert_eq!(response.body_json().unwrap()["story"]["id"], "offline-1");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.keys(cache_names::STORY_DETAILS).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_navigation_offline_falls_back_to_precached_shell() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::always_ok("<html>shell</html>");
    let mut config = test_config();
    config.precache_urls = vec!["/".to_string(), "/index.html".to_string()];
    let router = CacheRouter::new(cache, network.clone(), &config).unwrap();

    assert_eq!(router.install().await, 2);
    network.set_online(false);

    let response = router
        .handle(get(&format!("{}/#/stories/abc", APP_ORIGIN)).navigate())
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"<html>shell</html>");

    let unknown = router.handle(get("https://elsewhere.example/x")).await;
    assert_eq!(unknown.status, 503);
}

#[tokio::test]
async fn test_activate_removes_unowned_caches() {
    let cache = memory_cache().await;
    let entry = CachedResponse::from_response(&HttpResponse::text(200, "x"), chrono::Utc::now());
    cache.put("legacy-v1", "k", entry.clone()).await.unwrap();
    cache.put(cache_names::IMAGES, "k", entry.clone()).await.unwrap();
    cache.put("offline-forms", "k", entry).await.unwrap();

    let router = CacheRouter::new(cache.clone(), ScriptedNetwork::offline(), &test_config()).unwrap();
    let removed = router.activate(&["offline-forms"]).await.unwrap();

    assert_eq!(removed, vec!["legacy-v1".to_string()]);
    let names = cache.cache_names().await.unwrap();
    assert!(names.contains(&cache_names::IMAGES.to_string()));
    assert!(names.contains(&"offline-forms".to_string()));
    assert!(!names.contains(&"legacy-v1".to_string()));
}

#[tokio::test]
async fn test_router_works_through_shared_arc() {
    let cache = memory_cache().await;
    let router = Arc::new(CacheRouter::new(cache, ScriptedNetwork::offline(), &test_config()).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.handle(get(&story_url(&format!("/stories/s{}", i)))).await })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, 200);
    }
}

#[tokio::test]
async fn test_network_timeout_falls_back_to_cached_entry() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::new(|_| {
        Ok(HttpResponse::json(200, &json!({"error": false, "story": {"id": "x", "description": "cached"}})))
    });
    let mut config = test_config();
    config.network_timeout = Duration::from_millis(50);
    let router = CacheRouter::new(cache, network.clone(), &config).unwrap();

    let online = router.handle(get(&story_url("/stories/x"))).await;
    assert_eq!(online.status, 200);

    network.set_handler(|_| {
        Ok(HttpResponse::json(200, &json!({"error": false, "story": {"id": "x", "description": "late"}})))
    });
    network.set_delay(Duration::from_millis(300));

    let slow = router.handle(get(&story_url("/stories/x"))).await;
    assert_eq!(slow.status, 200);
    assert_eq!(slow.body, online.body);
    assert_eq!(slow.body_json().unwrap()["story"]["description"], "cached");
}

#[tokio::test]
async fn test_cross_origin_navigation_cannot_replace_app_shell() {
    let cache = memory_cache().await;
    let network = ScriptedNetwork::new(|request| {
        if request.url.host_str() == Some("evil.example") {
            Ok(HttpResponse::text(200, "<html>EVIL</html>"))
        } else {
            Ok(HttpResponse::text(200, "<html>shell</html>"))
        }
    });
    let router = CacheRouter::new(cache.clone(), network.clone(), &test_config()).unwrap();

    router
        .handle(get(&format!("{}/#/home", APP_ORIGIN)).navigate())
        .await;
    let foreign = router.handle(get("https://evil.example/").navigate()).await;
    assert_eq!(&foreign.body[..], b"<html>EVIL</html>");

    network.set_online(false);
    let offline = router
        .handle(get(&format!("{}/#/home", APP_ORIGIN)).navigate())
        .await;
    assert_eq!(&offline.body[..], b"<html>shell</html>");

    let pages = cache.keys(cache_names::PAGES).await.unwrap();
    assert_eq!(pages, vec![format!("GET {}/index.html", APP_ORIGIN)]);
}
