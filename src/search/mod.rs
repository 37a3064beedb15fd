// src/search/mod.rs
//! Similarity search pass-through. Matching happens in the backend; this side
//! forwards the query and maps the ranked answer onto gallery-shaped items.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::GalleryError;
use crate::gallery::providers::BackendSettings;

pub const DEFAULT_TOP_K: u32 = 20;
pub const VISUAL_SEARCH_TOPIC: &str = "visual_search";

/// Image query plus optional refinements.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub image: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
    pub top_k: u32,
    pub max_price: Option<f64>,
    pub negative_query: Option<String>,
    pub query_text: Option<String>,
    pub category: Option<String>,
}

impl SimilarityQuery {
    pub fn new(image: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            image,
            file_name: file_name.into(),
            content_type: None,
            top_k: DEFAULT_TOP_K,
            max_price: None,
            negative_query: None,
            query_text: None,
            category: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedItem {
    pub id: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub title: String,
    pub source_url: String,
    pub topic: String,
    pub price: Option<f64>,
    pub brand: Option<String>,
    pub category: Option<String>,
    /// Similarity in [0, 1], higher is closer.
    pub score: f64,
}

#[async_trait]
pub trait ProductMatcher: Send + Sync {
    /// Ranked matches, best first.
    async fn match_image(&self, query: SimilarityQuery) -> Result<Vec<MatchedItem>, GalleryError>;
    /// Forward a "shop the look" request and return the backend answer untouched.
    async fn shop_the_look(&self, body: Value) -> Result<Value, GalleryError>;
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    matches: Vec<BackendMatch>,
}

#[derive(Debug, Deserialize)]
struct BackendMatch {
    product_id: Value,
    #[serde(default)]
    title: String,
    image_url: String,
    #[serde(default, deserialize_with = "de_price")]
    price: Option<f64>,
    #[serde(default)]
    visual_score: Option<f64>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    pdp_url: Option<String>,
}

// Decimal prices arrive as strings ("49.99") or plain numbers.
fn de_price<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn clamp_score(s: Option<f64>) -> f64 {
    match s {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

impl From<BackendMatch> for MatchedItem {
    fn from(m: BackendMatch) -> Self {
        let id = match m.product_id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let source_url = m
            .pdp_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| m.image_url.clone());
        MatchedItem {
            id,
            thumbnail_url: m.image_url.clone(),
            image_url: m.image_url,
            title: m.title,
            source_url,
            topic: VISUAL_SEARCH_TOPIC.to_string(),
            price: m.price,
            brand: m.brand.filter(|b| !b.is_empty()),
            category: m.category,
            score: clamp_score(m.visual_score),
        }
    }
}

/// Pull `error` out of a backend JSON body, falling back to `default`.
fn upstream_message(body: &Value, default: &str) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn transport(e: reqwest::Error) -> GalleryError {
    GalleryError::Upstream {
        status: 502,
        message: e.to_string(),
    }
}

/// Matcher backed by the persistence/search backend.
pub struct BackendMatcher {
    http: reqwest::Client,
    settings: BackendSettings,
}

impl BackendMatcher {
    pub fn new(settings: BackendSettings) -> anyhow::Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            settings,
        })
    }

    fn form(query: SimilarityQuery) -> Result<Form, GalleryError> {
        let file_name = if query.file_name.trim().is_empty() {
            "image.jpg".to_string()
        } else {
            query.file_name
        };
        let mut part = Part::bytes(query.image).file_name(file_name);
        if let Some(ct) = query.content_type.as_deref() {
            part = part
                .mime_str(ct)
                .map_err(|_| GalleryError::InvalidRequest(format!("unsupported content type '{ct}'")))?;
        }

        let mut form = Form::new()
            .part("image", part)
            .text("top_k", query.top_k.to_string());
        if let Some(p) = query.max_price {
            form = form.text("max_price", p.to_string());
        }
        if let Some(s) = query.negative_query {
            form = form.text("negative_query", s);
        }
        if let Some(s) = query.query_text {
            form = form.text("query_text", s);
        }
        if let Some(s) = query.category {
            form = form.text("category", s);
        }
        Ok(form)
    }
}

#[async_trait]
impl ProductMatcher for BackendMatcher {
    async fn match_image(&self, query: SimilarityQuery) -> Result<Vec<MatchedItem>, GalleryError> {
        let size = query.image.len();
        let form = Self::form(query)?;
        info!(bytes = size, "forwarding image search");

        let resp = self
            .http
            .post(self.settings.url("api/search/image/"))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let is_json = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            warn!(status = status.as_u16(), "image search returned non-JSON body");
            return Err(GalleryError::Upstream {
                status: if status.is_success() { 502 } else { status.as_u16() },
                message: "backend returned a non-JSON response".to_string(),
            });
        }

        let body: Value = resp.json().await.map_err(transport)?;
        if !status.is_success() {
            return Err(GalleryError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body, "failed to search image"),
            });
        }

        let parsed: MatchResponse = serde_json::from_value(body).map_err(|e| GalleryError::Upstream {
            status: 502,
            message: format!("malformed match list: {e}"),
        })?;

        let mut items: Vec<MatchedItem> = parsed.matches.into_iter().map(MatchedItem::from).collect();
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(items)
    }

    async fn shop_the_look(&self, body: Value) -> Result<Value, GalleryError> {
        let has_url = body
            .get("external_image_url")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !has_url {
            return Err(GalleryError::InvalidRequest(
                "external_image_url is required".to_string(),
            ));
        }

        let resp = self
            .http
            .post(self.settings.url("api/search/shop-the-look/"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let answer: Value = resp.json().await.map_err(transport)?;
        if !status.is_success() {
            return Err(GalleryError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&answer, "failed to fetch shop the look results"),
            });
        }
        Ok(answer)
    }
}
