// src/gallery/types.rs
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::GalleryError;

/// One gallery tile as returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub title: String,
    pub source_url: String,
    pub topic: String,
}

/// Entry as extracted by the live provider (`img@src`, `img@alt`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub alt: Option<String>,
}

impl RawEntry {
    pub fn new(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt: Some(alt.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// `None` or blank resolves to the configured default topic.
    pub topic: Option<String>,
    pub force_fresh: bool,
}

impl ResolutionRequest {
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            force_fresh: false,
        }
    }

    pub fn fresh(mut self) -> Self {
        self.force_fresh = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionResult {
    pub topic: String,
    pub items: Vec<Item>,
    pub served_from_cache: bool,
    pub warning: Option<String>,
}

impl ResolutionResult {
    pub fn total(&self) -> usize {
        self.items.len()
    }
}

/// Freshness hint attached to live fetches.
///
/// `Fresh` carries a strictly increasing, time-derived token so repeated
/// forced-fresh calls never present the provider with the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Static,
    Fresh(u64),
}

impl Freshness {
    pub fn for_request(force_fresh: bool) -> Self {
        if force_fresh {
            Freshness::Fresh(next_token())
        } else {
            Freshness::Static
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh(_))
    }

    pub fn token(&self) -> Option<u64> {
        match self {
            Freshness::Static => None,
            Freshness::Fresh(t) => Some(*t),
        }
    }

    /// Middle segment of synthetic item ids.
    pub fn discriminator(&self) -> String {
        match self {
            Freshness::Static => "static".to_string(),
            Freshness::Fresh(t) => t.to_string(),
        }
    }
}

// Wall-clock millis, bumped past the previous token when the clock stalls or steps back.
fn next_token() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev.saturating_add(1));
        match LAST.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Persistence collaborator keyed by topic.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Stored items for `topic`, at most `limit` of them.
    async fn list(&self, topic: &str, limit: usize) -> Result<Vec<Item>, GalleryError>;
    /// Append a normalized batch under `topic`; returns how many rows the store accepted.
    async fn store(&self, topic: &str, items: Vec<Item>) -> Result<usize, GalleryError>;
    fn name(&self) -> &'static str;
}

/// On-demand content provider.
#[async_trait::async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch(&self, topic: &str, freshness: Freshness)
        -> Result<Vec<RawEntry>, GalleryError>;
    fn name(&self) -> &'static str;
}
