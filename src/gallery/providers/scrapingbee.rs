// src/gallery/providers/scrapingbee.rs
use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::GalleryError;
use crate::gallery::normalize::NormalizeRules;
use crate::gallery::types::{Freshness, LiveSource, RawEntry};

use super::USER_AGENT;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScraperSettings {
    pub endpoint: String,
    /// `"ENV"` (or empty) means: read `SCRAPINGBEE_API_KEY`.
    pub api_key: String,
    /// Render wait for regular requests.
    pub render_wait_ms: u64,
    /// Scroll depth for fresh requests, to get past the first screen of pins.
    pub scroll_px: u32,
    pub timeout_ms: u64,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://app.scrapingbee.com/api/v1".to_string(),
            api_key: "ENV".to_string(),
            render_wait_ms: 2_000,
            scroll_px: 2_500,
            timeout_ms: 40_000,
        }
    }
}

// Never print the key itself.
impl fmt::Debug for ScraperSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperSettings")
            .field("endpoint", &self.endpoint)
            .field("api_key_len", &self.api_key.len())
            .field("render_wait_ms", &self.render_wait_ms)
            .field("scroll_px", &self.scroll_px)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    images: Vec<RawEntry>,
}

/// Live source backed by the ScrapingBee extraction API.
pub struct ScrapingBeeSource {
    http: reqwest::Client,
    settings: ScraperSettings,
    rules: NormalizeRules,
}

impl ScrapingBeeSource {
    pub fn new(settings: ScraperSettings, rules: NormalizeRules) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .context("building scraper http client")?;
        Ok(Self {
            http,
            settings,
            rules,
        })
    }

    /// Search page handed to the scraper; fresh requests carry the token as `rs`.
    pub fn target_url(&self, topic: &str, freshness: Freshness) -> String {
        match freshness.token() {
            Some(token) => self
                .rules
                .search_page_with(&[("q", topic), ("rs", token.to_string().as_str())]),
            None => self.rules.search_page_for(topic),
        }
    }

    fn query_params(&self, topic: &str, freshness: Freshness) -> Vec<(&'static str, String)> {
        let extract_rules = json!({
            "images": {
                "selector": "img",
                "type": "list",
                "output": { "src": "img@src", "alt": "img@alt" }
            }
        });

        let mut params = vec![
            ("api_key", self.settings.api_key.clone()),
            ("url", self.target_url(topic, freshness)),
            ("extract_rules", extract_rules.to_string()),
            ("render_js", "true".to_string()),
        ];

        if freshness.is_fresh() {
            let scenario = json!({
                "instructions": [
                    { "wait": 1000 },
                    { "scroll_y": self.settings.scroll_px },
                    { "wait": self.settings.render_wait_ms }
                ]
            });
            params.push(("js_scenario", scenario.to_string()));
        } else {
            params.push(("wait", self.settings.render_wait_ms.to_string()));
        }
        params
    }
}

#[async_trait]
impl LiveSource for ScrapingBeeSource {
    async fn fetch(&self, topic: &str, freshness: Freshness) -> Result<Vec<RawEntry>, GalleryError> {
        if self.settings.api_key.trim().is_empty() {
            return Err(GalleryError::LiveSourceUnavailable(
                "scraper api key not configured".to_string(),
            ));
        }

        let resp = self
            .http
            .get(&self.settings.endpoint)
            .query(&self.query_params(topic, freshness))
            .send()
            .await
            .map_err(GalleryError::live)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GalleryError::LiveSourceUnavailable(format!(
                "scraper returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: ExtractResponse = resp.json().await.map_err(GalleryError::live)?;
        Ok(body.images)
    }

    fn name(&self) -> &'static str {
        "scrapingbee"
    }
}
