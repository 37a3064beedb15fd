// src/config/mod.rs
//! Process-wide settings, resolved once at startup.
//!
//! Order: compiled defaults → TOML file → environment overrides → sanitize.
//! The TOML file is `$GALLERY_CONFIG_PATH` if set (must exist), otherwise
//! `config/gallery.toml` when present.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::gallery::normalize::NormalizeRules;
use crate::gallery::providers::{BackendSettings, ScraperSettings};
use crate::gallery::PolicySettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/gallery.toml";
pub const ENV_CONFIG_PATH: &str = "GALLERY_CONFIG_PATH";

pub const ENV_BACKEND_URL: &str = "BACKEND_URL";
pub const ENV_BACKEND_URL_LEGACY: &str = "DJANGO_BACKEND_URL";
pub const ENV_SCRAPER_KEY: &str = "SCRAPINGBEE_API_KEY";
pub const ENV_MIN_CACHED: &str = "GALLERY_MIN_CACHED_ITEMS";
pub const ENV_DEFAULT_TOPIC: &str = "GALLERY_DEFAULT_TOPIC";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub policy: PolicySettings,
    pub normalize: NormalizeRules,
    pub scraper: ScraperSettings,
    pub backend: BackendSettings,
}

impl Settings {
    /// Full startup resolution (file + env + sanitize).
    pub fn load() -> Result<Self> {
        let mut s = match config_path()? {
            Some(p) => Self::load_from_file(&p)?,
            None => Self::default(),
        };
        s.apply_env();
        s.sanitize();
        info!(
            min_cached = s.policy.min_cached_items,
            cache_limit = s.policy.cache_read_limit,
            default_topic = %s.policy.default_topic,
            backend = %s.backend.base_url,
            scraper_key_len = s.scraper.api_key.len(),
            "settings loaded"
        );
        if !s.scraper_key_configured() {
            warn!("{ENV_SCRAPER_KEY} not set: live fetches will fail and only cached content is served");
        }
        Ok(s)
    }

    /// Parse a TOML file as-is (no env, no sanitize).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn scraper_key_configured(&self) -> bool {
        !self.scraper.api_key.trim().is_empty()
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_nonempty(ENV_BACKEND_URL).or_else(|| env_nonempty(ENV_BACKEND_URL_LEGACY)) {
            self.backend.base_url = url;
        }

        // "ENV" placeholder (or nothing) means the key comes from the environment.
        let key = self.scraper.api_key.trim();
        if key.is_empty() || key.eq_ignore_ascii_case("env") {
            self.scraper.api_key = env_nonempty(ENV_SCRAPER_KEY).unwrap_or_default();
        }

        if let Some(n) = env_parse::<usize>(ENV_MIN_CACHED) {
            self.policy.min_cached_items = n;
        }
        if let Some(t) = env_nonempty(ENV_DEFAULT_TOPIC) {
            self.policy.default_topic = t;
        }
    }

    /// Replace values the resolver cannot work with.
    pub fn sanitize(&mut self) {
        let d = Settings::default();

        if self.policy.min_cached_items == 0 {
            self.policy.min_cached_items = 1;
        }
        if self.policy.cache_read_limit < self.policy.min_cached_items {
            self.policy.cache_read_limit = self.policy.min_cached_items;
        }
        if self.policy.live_timeout_ms == 0 {
            self.policy.live_timeout_ms = d.policy.live_timeout_ms;
        }
        self.policy.default_topic = self.policy.default_topic.trim().to_string();
        if self.policy.default_topic.is_empty() {
            self.policy.default_topic = d.policy.default_topic;
        }

        if self.normalize.tiers.is_empty() {
            self.normalize.tiers = d.normalize.tiers;
        }
        if self.normalize.media_host.trim().is_empty() {
            self.normalize.media_host = d.normalize.media_host;
        }
        if reqwest::Url::parse(&self.normalize.search_page_url).is_err() {
            warn!(url = %self.normalize.search_page_url, "invalid search_page_url, using default");
            self.normalize.search_page_url = d.normalize.search_page_url;
        }
        if self.normalize.placeholder_title.trim().is_empty() {
            self.normalize.placeholder_title = d.normalize.placeholder_title;
        }

        if self.scraper.timeout_ms == 0 {
            self.scraper.timeout_ms = d.scraper.timeout_ms;
        }
        if self.backend.timeout_ms == 0 {
            self.backend.timeout_ms = d.backend.timeout_ms;
        }
    }
}

fn config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display()));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: Display,
{
    let raw = env_nonempty(key)?;
    raw.parse()
        .map_err(|e| warn!("Invalid {key} value '{raw}': {e}"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml_str(
            r#"
[policy]
min_cached_items = 15

[backend]
base_url = "http://backend:8000"
"#,
        )
        .unwrap();
        assert_eq!(s.policy.min_cached_items, 15);
        assert_eq!(s.policy.cache_read_limit, 50);
        assert_eq!(s.backend.base_url, "http://backend:8000");
        assert_eq!(s.backend.source_label, "pinterest");
        assert_eq!(s.normalize, NormalizeRules::default());
    }

    #[test]
    fn sanitize_fixes_unusable_values() {
        let mut s = Settings::default();
        s.policy.min_cached_items = 0;
        s.policy.cache_read_limit = 0;
        s.policy.live_timeout_ms = 0;
        s.policy.default_topic = "   ".into();
        s.normalize.tiers.clear();
        s.normalize.search_page_url = "not a url".into();
        s.sanitize();

        assert_eq!(s.policy.min_cached_items, 1);
        assert_eq!(s.policy.cache_read_limit, 1);
        assert_eq!(s.policy.live_timeout_ms, 45_000);
        assert_eq!(s.policy.default_topic, "fashion");
        assert_eq!(s.normalize.tiers.len(), 3);
        assert_eq!(
            s.normalize.search_page_url,
            NormalizeRules::default().search_page_url
        );
    }

    #[test]
    fn read_limit_never_below_threshold() {
        let mut s = Settings::default();
        s.policy.min_cached_items = 80;
        s.sanitize();
        assert_eq!(s.policy.cache_read_limit, 80);
    }

    #[test]
    fn unknown_toml_is_error() {
        assert!(Settings::from_toml_str("policy = 3").is_err());
    }
}
