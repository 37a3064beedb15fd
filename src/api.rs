use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::GalleryError;
use crate::gallery::providers::{BackendCacheStore, MemoryCacheStore, ScrapingBeeSource};
use crate::gallery::types::{CacheStore, Item, ResolutionRequest, ResolutionResult};
use crate::gallery::Resolver;
use crate::search::{BackendMatcher, MatchedItem, ProductMatcher, SimilarityQuery};

/// Uploads above this are rejected before reaching the handler.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub matcher: Arc<dyn ProductMatcher>,
}

impl AppState {
    pub fn new(resolver: Resolver, matcher: Arc<dyn ProductMatcher>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            matcher,
        }
    }

    /// Wire the production clients from settings.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let cache: Arc<dyn CacheStore> = if settings.backend.is_configured() {
            Arc::new(BackendCacheStore::new(
                settings.backend.clone(),
                settings.normalize.clone(),
            )?)
        } else {
            warn!("no backend configured, caching in process memory");
            Arc::new(MemoryCacheStore::new())
        };
        let live = Arc::new(ScrapingBeeSource::new(
            settings.scraper.clone(),
            settings.normalize.clone(),
        )?);
        let resolver = Resolver::new(
            cache,
            live,
            settings.policy.clone(),
            settings.normalize.clone(),
        );
        let matcher = Arc::new(BackendMatcher::new(settings.backend.clone())?);
        Ok(Self::new(resolver, matcher))
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/fetch-pins", get(fetch_pins))
        .route(
            "/api/search-image",
            post(search_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/shop-the-look", post(shop_the_look))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FetchPinsQuery {
    #[serde(default, alias = "query")]
    topic: Option<String>,
    #[serde(default, rename = "forceFresh", alias = "shuffle")]
    force_fresh: Option<String>,
}

fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(str::trim)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Wire shape of a resolution (success or failure).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPayload {
    pub success: bool,
    pub items: Vec<Item>,
    pub total: usize,
    pub topic: String,
    pub served_from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ResolutionResult> for ResolutionPayload {
    fn from(r: ResolutionResult) -> Self {
        Self {
            success: true,
            total: r.total(),
            items: r.items,
            topic: r.topic,
            served_from_cache: r.served_from_cache,
            warning: r.warning,
            error: None,
        }
    }
}

impl ResolutionPayload {
    pub fn failure(topic: String, e: &GalleryError) -> Self {
        Self {
            success: false,
            items: Vec::new(),
            total: 0,
            topic,
            served_from_cache: false,
            warning: None,
            error: Some(e.to_string()),
        }
    }
}

async fn fetch_pins(
    State(state): State<AppState>,
    query: Result<Query<FetchPinsQuery>, QueryRejection>,
) -> (StatusCode, Json<ResolutionPayload>) {
    // Malformed query strings still get the resolution payload shape.
    let q = match query {
        Ok(Query(q)) => q,
        Err(rej) => {
            let e = GalleryError::InvalidRequest(rej.body_text());
            warn!(error = %e, "rejected fetch-pins query");
            return (
                StatusCode::BAD_REQUEST,
                Json(ResolutionPayload::failure(String::new(), &e)),
            );
        }
    };
    let req = ResolutionRequest {
        topic: q.topic.clone(),
        force_fresh: parse_flag(q.force_fresh.as_deref()),
    };

    match state.resolver.resolve(req).await {
        Ok(res) => (StatusCode::OK, Json(res.into())),
        Err(e) => {
            error!(topic = ?q.topic, error = %e, "resolution failed");
            let topic = match &e {
                GalleryError::NoContentAvailable { topic } => topic.clone(),
                _ => q.topic.unwrap_or_default(),
            };
            (e.status_code(), Json(ResolutionPayload::failure(topic, &e)))
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchPayload {
    success: bool,
    items: Vec<MatchedItem>,
    total: usize,
}

fn invalid(e: impl std::fmt::Display) -> GalleryError {
    GalleryError::InvalidRequest(e.to_string())
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

async fn search_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SearchPayload>, GalleryError> {
    let mut query: Option<SimilarityQuery> = None;
    let mut top_k = None;
    let mut max_price = None;
    let mut negative_query = None;
    let mut query_text = None;
    let mut category = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image.jpg").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid)?;
                if bytes.is_empty() {
                    continue;
                }
                let mut q = SimilarityQuery::new(bytes.to_vec(), file_name);
                q.content_type = content_type;
                query = Some(q);
            }
            "top_k" => {
                let raw = field.text().await.map_err(invalid)?;
                let n: u32 = raw
                    .trim()
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("top_k must be a positive integer"))?;
                top_k = Some(n);
            }
            "max_price" => {
                let raw = field.text().await.map_err(invalid)?;
                if let Some(raw) = non_empty(raw) {
                    let p: f64 = raw.parse().map_err(|_| invalid("max_price must be a number"))?;
                    max_price = Some(p);
                }
            }
            "negative_query" => negative_query = non_empty(field.text().await.map_err(invalid)?),
            "query_text" => query_text = non_empty(field.text().await.map_err(invalid)?),
            "category" => category = non_empty(field.text().await.map_err(invalid)?),
            _ => {}
        }
    }

    let Some(mut query) = query else {
        return Err(invalid("No image file provided"));
    };
    if let Some(k) = top_k {
        query.top_k = k;
    }
    query.max_price = max_price;
    query.negative_query = negative_query;
    query.query_text = query_text;
    query.category = category;

    let items = state.matcher.match_image(query).await.map_err(|e| {
        error!(error = %e, "image search failed");
        e
    })?;
    info!(matches = items.len(), "image search done");
    Ok(Json(SearchPayload {
        success: true,
        total: items.len(),
        items,
    }))
}

async fn shop_the_look(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GalleryError> {
    state.matcher.shop_the_look(body).await.map(Json).map_err(|e| {
        error!(error = %e, "shop-the-look failed");
        e
    })
}
