// tests/providers_http.rs
//
// Provider clients against local stand-in servers bound to 127.0.0.1:0.
// Covered: scraper request shape + failures, backend cache list/store,
// backend image matcher (ranking, upstream errors, non-JSON answers).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use gallery_resolver::gallery::normalize::NormalizeRules;
use gallery_resolver::gallery::providers::{
    BackendCacheStore, BackendSettings, ScraperSettings, ScrapingBeeSource,
};
use gallery_resolver::gallery::types::{CacheStore, Freshness, Item, LiveSource};
use gallery_resolver::search::{BackendMatcher, ProductMatcher, SimilarityQuery};
use gallery_resolver::GalleryError;

type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn backend(addr: SocketAddr) -> BackendSettings {
    BackendSettings {
        base_url: format!("http://{addr}"),
        ..BackendSettings::default()
    }
}

// ---------- scraper ----------

async fn scraper_app(seen: Seen, status: StatusCode) -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/v1",
            get(
                |State((seen, status)): State<(Seen, StatusCode)>,
                 Query(q): Query<HashMap<String, String>>| async move {
                    seen.lock().unwrap().push(q);
                    (
                        status,
                        Json(json!({
                            "images": [
                                { "src": "https://i.pinimg.com/236x/a/1.jpg", "alt": "linen summer dress" },
                                { "src": "https://s.pinimg.com/logo.png", "alt": null }
                            ]
                        })),
                    )
                },
            ),
        )
        .with_state((seen, status));
    serve(app).await
}

fn scraper(addr: SocketAddr, key: &str) -> ScrapingBeeSource {
    let settings = ScraperSettings {
        endpoint: format!("http://{addr}/api/v1"),
        api_key: key.to_string(),
        ..ScraperSettings::default()
    };
    ScrapingBeeSource::new(settings, NormalizeRules::default()).unwrap()
}

#[tokio::test]
async fn scraper_sends_render_params_and_parses_entries() {
    let seen: Seen = Arc::default();
    let addr = scraper_app(seen.clone(), StatusCode::OK).await;

    let entries = scraper(addr, "k-123")
        .fetch("summer dresses", Freshness::Static)
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].alt.as_deref(), Some("linen summer dress"));
    assert_eq!(entries[1].alt, None);

    let q = seen.lock().unwrap()[0].clone();
    assert_eq!(q["api_key"], "k-123");
    assert_eq!(q["render_js"], "true");
    assert_eq!(q["wait"], "2000");
    assert_eq!(q["url"], "https://in.pinterest.com/search/pins/?q=summer+dresses");
    let rules: Value = serde_json::from_str(&q["extract_rules"]).unwrap();
    assert_eq!(rules["images"]["selector"], "img");
}

#[tokio::test]
async fn scraper_fresh_request_scrolls_and_tags_url() {
    let seen: Seen = Arc::default();
    let addr = scraper_app(seen.clone(), StatusCode::OK).await;

    scraper(addr, "k").fetch("boots", Freshness::Fresh(777)).await.unwrap();

    let q = seen.lock().unwrap()[0].clone();
    assert!(q["url"].ends_with("&rs=777"), "url was {}", q["url"]);
    assert!(q.contains_key("js_scenario"));
    assert!(!q.contains_key("wait"));
}

#[tokio::test]
async fn scraper_http_error_is_live_unavailable() {
    let seen: Seen = Arc::default();
    let addr = scraper_app(seen, StatusCode::INTERNAL_SERVER_ERROR).await;

    let err = scraper(addr, "k").fetch("boots", Freshness::Static).await.unwrap_err();
    assert!(matches!(err, GalleryError::LiveSourceUnavailable(_)), "{err:?}");
}

#[tokio::test]
async fn scraper_without_key_fails_before_any_request() {
    let seen: Seen = Arc::default();
    let addr = scraper_app(seen.clone(), StatusCode::OK).await;

    let err = scraper(addr, "").fetch("boots", Freshness::Static).await.unwrap_err();
    assert!(matches!(err, GalleryError::LiveSourceUnavailable(_)));
    assert!(seen.lock().unwrap().is_empty());
}

// ---------- backend cache ----------

#[derive(Clone, Default)]
struct BackendState {
    listed: Seen,
    stored: Arc<Mutex<Vec<Value>>>,
}

async fn backend_app(state: BackendState) -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/gallery/",
            get(
                |State(s): State<BackendState>, Query(q): Query<HashMap<String, String>>| async move {
                    s.listed.lock().unwrap().push(q);
                    Json(json!({
                        "success": true,
                        "images": [
                            { "id": 9, "image_url": "https://i.pinimg.com/474x/z/9.jpg",
                              "thumbnail_url": "https://i.pinimg.com/236x/z/9.jpg", "caption": "Wool  coat" },
                            { "id": 8, "image_url": "https://i.pinimg.com/474x/z/8.jpg" }
                        ]
                    }))
                },
            ),
        )
        .route(
            "/api/scraped-images/",
            post(|State(s): State<BackendState>, Json(body): Json<Value>| async move {
                let n = body["images"].as_array().map_or(0, Vec::len);
                s.stored.lock().unwrap().push(body);
                (StatusCode::CREATED, Json(json!({ "created_count": n })))
            }),
        )
        .with_state(state);
    serve(app).await
}

#[tokio::test]
async fn backend_cache_lists_rows_as_items() {
    let state = BackendState::default();
    let addr = backend_app(state.clone()).await;
    let store = BackendCacheStore::new(backend(addr), NormalizeRules::default()).unwrap();

    let items = store.list("coats", 50).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "db-9");
    assert_eq!(items[0].title, "Wool coat");
    assert_eq!(items[1].title, "Fashion inspiration");
    assert_eq!(items[1].thumbnail_url, items[1].image_url);

    let q = state.listed.lock().unwrap()[0].clone();
    assert_eq!(q["source"], "pinterest");
    assert_eq!(q["query"], "coats");
    assert_eq!(q["limit"], "50");
}

#[tokio::test]
async fn backend_cache_store_posts_rows() {
    let state = BackendState::default();
    let addr = backend_app(state.clone()).await;
    let store = BackendCacheStore::new(backend(addr), NormalizeRules::default()).unwrap();

    let item = Item {
        id: "coats-static-0".into(),
        image_url: "https://i.pinimg.com/474x/z/1.jpg".into(),
        thumbnail_url: "https://i.pinimg.com/236x/z/1.jpg".into(),
        title: "camel wool coat".into(),
        source_url: "https://in.pinterest.com/search/pins/?q=coats".into(),
        topic: "coats".into(),
    };
    let created = store.store("coats", vec![item]).await.unwrap();
    assert_eq!(created, 1);

    let body = state.stored.lock().unwrap()[0].clone();
    let row = &body["images"][0];
    assert_eq!(row["image_url"], "https://i.pinimg.com/474x/z/1.jpg");
    assert_eq!(row["thumbnail_url"], "https://i.pinimg.com/236x/z/1.jpg");
    assert_eq!(row["source"], "pinterest");
    assert_eq!(row["caption"], "camel wool coat");
    assert_eq!(row["query"], "coats");
    assert_eq!(row["hashtags"], json!([]));
}

#[tokio::test]
async fn unreachable_backend_is_cache_unavailable() {
    // Bind and drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = BackendCacheStore::new(backend(addr), NormalizeRules::default()).unwrap();
    let err = store.list("coats", 10).await.unwrap_err();
    assert!(matches!(err, GalleryError::CacheUnavailable(_)));
}

// ---------- matcher ----------

async fn matcher_app(mode: &'static str) -> SocketAddr {
    let app = Router::new().route(
        "/api/search/image/",
        post(move |mut mp: Multipart| async move {
            let mut fields = HashMap::new();
            while let Some(f) = mp.next_field().await.unwrap() {
                let name = f.name().unwrap_or_default().to_string();
                let bytes = f.bytes().await.unwrap();
                fields.insert(name, bytes.len());
            }
            match mode {
                "ok" => (
                    StatusCode::OK,
                    [("content-type", "application/json")],
                    json!({
                        "fields": fields.len(),
                        "matches": [
                            { "product_id": 1, "title": "low", "image_url": "https://cdn.example/1.jpg",
                              "price": "19.99", "visual_score": 0.2 },
                            { "product_id": 2, "title": "high", "image_url": "https://cdn.example/2.jpg",
                              "price": 45, "visual_score": 0.8, "pdp_url": "https://shop.example/2" }
                        ]
                    })
                    .to_string(),
                ),
                "bad" => (
                    StatusCode::BAD_REQUEST,
                    [("content-type", "application/json")],
                    json!({ "error": "image could not be decoded" }).to_string(),
                ),
                _ => (
                    StatusCode::BAD_GATEWAY,
                    [("content-type", "text/html")],
                    "<html>bad gateway</html>".to_string(),
                ),
            }
        }),
    );
    serve(app).await
}

#[tokio::test]
async fn matcher_ranks_by_score() {
    let addr = matcher_app("ok").await;
    let matcher = BackendMatcher::new(backend(addr)).unwrap();

    let mut q = SimilarityQuery::new(b"jpeg-bytes".to_vec(), "look.jpg");
    q.query_text = Some("linen".into());
    let items = matcher.match_image(q).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "2");
    assert_eq!(items[0].source_url, "https://shop.example/2");
    assert_eq!(items[0].price, Some(45.0));
    assert_eq!(items[1].id, "1");
    assert_eq!(items[1].price, Some(19.99));
}

#[tokio::test]
async fn matcher_surfaces_backend_error_message() {
    let addr = matcher_app("bad").await;
    let matcher = BackendMatcher::new(backend(addr)).unwrap();

    let err = matcher
        .match_image(SimilarityQuery::new(vec![1, 2, 3], "x.jpg"))
        .await
        .unwrap_err();
    match err {
        GalleryError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "image could not be decoded");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn matcher_rejects_non_json_answers() {
    let addr = matcher_app("html").await;
    let matcher = BackendMatcher::new(backend(addr)).unwrap();

    let err = matcher
        .match_image(SimilarityQuery::new(vec![1], "x.jpg"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn shop_the_look_requires_external_url() {
    let matcher = BackendMatcher::new(BackendSettings::default()).unwrap();
    let err = matcher.shop_the_look(json!({})).await.unwrap_err();
    assert!(matches!(err, GalleryError::InvalidRequest(_)));
}
