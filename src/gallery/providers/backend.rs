// src/gallery/providers/backend.rs
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GalleryError;
use crate::gallery::normalize::{from_cached_row, CachedRow, NormalizeRules};
use crate::gallery::types::{CacheStore, Item};

use super::USER_AGENT;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendSettings {
    /// Empty means no backend: an in-process store is used instead.
    pub base_url: String,
    /// `source` column value for rows this service writes and reads.
    pub source_label: String,
    pub timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            source_label: "pinterest".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl BackendSettings {
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub(crate) fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .context("building backend http client")
    }
}

#[derive(Debug, Deserialize)]
struct GalleryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    images: Vec<CachedRow>,
}

#[derive(Debug, Serialize)]
struct StoreRow<'a> {
    image_url: &'a str,
    thumbnail_url: &'a str,
    source: &'a str,
    caption: &'a str,
    query: &'a str,
    hashtags: [&'a str; 0],
}

#[derive(Debug, Serialize)]
struct StoreRequest<'a> {
    images: Vec<StoreRow<'a>>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreResponse {
    #[serde(default)]
    created_count: usize,
}

/// Cache store backed by the persistence backend's gallery endpoints.
pub struct BackendCacheStore {
    http: reqwest::Client,
    settings: BackendSettings,
    rules: NormalizeRules,
}

impl BackendCacheStore {
    pub fn new(settings: BackendSettings, rules: NormalizeRules) -> anyhow::Result<Self> {
        Ok(Self {
            http: settings.http_client()?,
            settings,
            rules,
        })
    }
}

#[async_trait]
impl CacheStore for BackendCacheStore {
    async fn list(&self, topic: &str, limit: usize) -> Result<Vec<Item>, GalleryError> {
        let resp = self
            .http
            .get(self.settings.url("api/gallery/"))
            .query(&[
                ("source", self.settings.source_label.as_str()),
                ("query", topic),
                ("limit", limit.to_string().as_str()),
            ])
            .send()
            .await
            .map_err(GalleryError::cache)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GalleryError::CacheUnavailable(format!(
                "gallery listing returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: GalleryResponse = resp.json().await.map_err(GalleryError::cache)?;
        if !body.success {
            return Ok(Vec::new());
        }

        Ok(body
            .images
            .iter()
            .take(limit)
            .map(|row| from_cached_row(row, topic, &self.rules))
            .collect())
    }

    async fn store(&self, topic: &str, items: Vec<Item>) -> Result<usize, GalleryError> {
        let payload = StoreRequest {
            images: items
                .iter()
                .map(|it| StoreRow {
                    image_url: &it.image_url,
                    thumbnail_url: &it.thumbnail_url,
                    source: &self.settings.source_label,
                    caption: &it.title,
                    query: topic,
                    hashtags: [],
                })
                .collect(),
        };

        let resp = self
            .http
            .post(self.settings.url("api/scraped-images/"))
            .json(&payload)
            .send()
            .await
            .map_err(GalleryError::cache)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GalleryError::CacheUnavailable(format!(
                "store returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: StoreResponse = resp.json().await.unwrap_or_default();
        Ok(body.created_count)
    }

    fn name(&self) -> &'static str {
        "backend"
    }
}
