// src/gallery/normalize.rs
//! Turns provider payloads into canonical [`Item`]s.
//!
//! Live entries are filtered (media host, resolution tier, caption length),
//! upgraded to a higher resolution tier and given synthetic ids. Cache rows are
//! trusted and only mapped. Applying the rules to already canonical items is a
//! no-op.

use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::gallery::types::{Freshness, Item, RawEntry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NormalizeRules {
    /// Host every media URL must be served from.
    pub media_host: String,
    /// Recognized resolution-tier path segments.
    pub tiers: Vec<String>,
    pub upgrade_from: String,
    pub upgrade_to: String,
    /// Captions shorter than this (in chars, after cleanup) are noise.
    pub min_caption_len: usize,
    /// Public search page used for `sourceUrl` (topic goes into `q`).
    pub search_page_url: String,
    /// Title for cache rows stored without a caption.
    pub placeholder_title: String,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            media_host: "i.pinimg.com".to_string(),
            tiers: vec!["236x".to_string(), "474x".to_string(), "736x".to_string()],
            upgrade_from: "236x".to_string(),
            upgrade_to: "474x".to_string(),
            min_caption_len: 10,
            search_page_url: "https://in.pinterest.com/search/pins/".to_string(),
            placeholder_title: "Fashion inspiration".to_string(),
        }
    }
}

/// Counters from one normalization pass (logged + exported as metrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub kept: usize,
    pub off_host: usize,
    pub unknown_tier: usize,
    pub short_caption: usize,
}

impl NormalizeReport {
    pub fn filtered(&self) -> usize {
        self.off_host + self.unknown_tier + self.short_caption
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    OffHost,
    UnknownTier,
}

/// Row shape returned by the persistence backend's gallery listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CachedRow {
    /// Numeric in practice; strings are accepted too.
    pub id: serde_json::Value,
    pub image_url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

impl CachedRow {
    fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Decode HTML entities, collapse whitespace, trim.
pub fn clean_caption(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

impl NormalizeRules {
    /// `sourceUrl` for items resolved under `topic`.
    pub fn search_page_for(&self, topic: &str) -> String {
        self.search_page_with(&[("q", topic)])
    }

    pub(crate) fn search_page_with(&self, params: &[(&str, &str)]) -> String {
        match Url::parse_with_params(&self.search_page_url, params) {
            Ok(u) => u.to_string(),
            Err(_) => self.search_page_url.clone(),
        }
    }

    fn check_media(&self, src: &str) -> Result<(), Rejection> {
        let url = Url::parse(src.trim()).map_err(|_| Rejection::OffHost)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::OffHost);
        }
        let host_ok = url
            .host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.media_host));
        if !host_ok {
            return Err(Rejection::OffHost);
        }
        let has_tier = url
            .path_segments()
            .is_some_and(|mut segs| segs.any(|s| self.tiers.iter().any(|t| t == s)));
        if has_tier {
            Ok(())
        } else {
            Err(Rejection::UnknownTier)
        }
    }

    fn caption_ok(&self, caption: &str) -> bool {
        !caption.is_empty() && caption.chars().count() >= self.min_caption_len
    }

    /// Swap the `upgrade_from` tier segment for `upgrade_to`. URLs without it are returned unchanged.
    pub fn upgrade(&self, src: &str) -> String {
        let src = src.trim();
        let Ok(mut url) = Url::parse(src) else {
            return src.to_string();
        };
        if !url.path().split('/').any(|s| s == self.upgrade_from) {
            return src.to_string();
        }
        let path = url
            .path()
            .split('/')
            .map(|s| {
                if s == self.upgrade_from {
                    self.upgrade_to.as_str()
                } else {
                    s
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        url.set_path(&path);
        url.to_string()
    }
}

/// Filter and canonicalize one live batch.
///
/// Ids are `{topic}-{discriminator}-{position}` where position counts kept
/// entries only: unique within the batch, not stable across requests.
pub fn normalize_entries(
    raw: Vec<RawEntry>,
    topic: &str,
    freshness: Freshness,
    rules: &NormalizeRules,
) -> (Vec<Item>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut items = Vec::with_capacity(raw.len());
    let discriminator = freshness.discriminator();
    let source_url = rules.search_page_for(topic);

    for entry in raw {
        match rules.check_media(&entry.src) {
            Err(Rejection::OffHost) => {
                report.off_host += 1;
                continue;
            }
            Err(Rejection::UnknownTier) => {
                report.unknown_tier += 1;
                continue;
            }
            Ok(()) => {}
        }

        let caption = clean_caption(entry.alt.as_deref().unwrap_or_default());
        if !rules.caption_ok(&caption) {
            report.short_caption += 1;
            continue;
        }

        let thumbnail = entry.src.trim().to_string();
        items.push(Item {
            id: format!("{topic}-{discriminator}-{}", items.len()),
            image_url: rules.upgrade(&thumbnail),
            thumbnail_url: thumbnail,
            title: caption,
            source_url: source_url.clone(),
            topic: topic.to_string(),
        });
    }

    report.kept = items.len();
    (items, report)
}

/// Map a stored row to an item under `topic`.
pub fn from_cached_row(row: &CachedRow, topic: &str, rules: &NormalizeRules) -> Item {
    let title = row
        .caption
        .as_deref()
        .map(clean_caption)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| rules.placeholder_title.clone());
    let thumbnail = row
        .thumbnail_url
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(&row.image_url)
        .to_string();

    Item {
        id: format!("db-{}", row.id_string()),
        image_url: row.image_url.clone(),
        thumbnail_url: thumbnail,
        title,
        source_url: rules.search_page_for(topic),
        topic: topic.to_string(),
    }
}
