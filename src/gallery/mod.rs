// src/gallery/mod.rs
//! Content resolution: decide per request whether to serve the cache, fetch
//! live, or fall back to stale cache.

pub mod normalize;
pub mod providers;
pub mod shuffle;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::GalleryError;
use crate::gallery::normalize::{normalize_entries, NormalizeRules};
use crate::gallery::shuffle::shuffle;
use crate::gallery::types::{
    CacheStore, Freshness, Item, LiveSource, ResolutionRequest, ResolutionResult,
};

pub const FALLBACK_WARNING: &str = "live fetch unavailable, showing cached results";
pub const MAX_TOPIC_CHARS: usize = 255;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("gallery_requests_total", "Resolution requests received.");
        describe_counter!(
            "gallery_cache_served_total",
            "Requests answered from a warm cache without a live call."
        );
        describe_counter!("gallery_live_fetch_total", "Live source calls issued.");
        describe_counter!(
            "gallery_live_errors_total",
            "Live source failures (error, timeout, malformed or empty)."
        );
        describe_counter!(
            "gallery_fallback_total",
            "Requests that took the stale-cache fallback."
        );
        describe_counter!(
            "gallery_cache_errors_total",
            "Cache reads that failed and were treated as empty."
        );
        describe_counter!(
            "gallery_cache_write_errors_total",
            "Background cache writes that failed."
        );
        describe_counter!(
            "gallery_entries_filtered_total",
            "Live entries discarded by normalization."
        );
        describe_histogram!("gallery_live_fetch_ms", "Live source latency in milliseconds.");
    });
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicySettings {
    /// Cached count at or above which no live call is made.
    pub min_cached_items: usize,
    /// Result-count limit passed to cache reads.
    pub cache_read_limit: usize,
    pub default_topic: String,
    pub live_timeout_ms: u64,
    /// Shuffle live results on forced-fresh requests too (fallback always shuffles).
    pub shuffle_fresh_results: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            min_cached_items: 30,
            cache_read_limit: 50,
            default_topic: "fashion".to_string(),
            live_timeout_ms: 45_000,
            shuffle_fresh_results: true,
        }
    }
}

pub struct Resolver {
    cache: Arc<dyn CacheStore>,
    live: Arc<dyn LiveSource>,
    policy: PolicySettings,
    rules: NormalizeRules,
}

impl Resolver {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        live: Arc<dyn LiveSource>,
        policy: PolicySettings,
        rules: NormalizeRules,
    ) -> Self {
        Self {
            cache,
            live,
            policy,
            rules,
        }
    }

    pub fn policy(&self) -> &PolicySettings {
        &self.policy
    }

    pub fn rules(&self) -> &NormalizeRules {
        &self.rules
    }

    /// Trimmed topic, or the default when absent/blank.
    pub fn resolve_topic(&self, raw: Option<&str>) -> Result<String, GalleryError> {
        let topic = raw.map(str::trim).unwrap_or_default();
        if topic.is_empty() {
            return Ok(self.policy.default_topic.clone());
        }
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(GalleryError::InvalidRequest(format!(
                "topic longer than {MAX_TOPIC_CHARS} characters"
            )));
        }
        Ok(topic.to_string())
    }

    pub async fn resolve(&self, req: ResolutionRequest) -> Result<ResolutionResult, GalleryError> {
        ensure_metrics_described();
        counter!("gallery_requests_total").increment(1);

        let topic = self.resolve_topic(req.topic.as_deref())?;

        let mut cached: Option<Vec<Item>> = None;
        if !req.force_fresh {
            let items = self.read_cache(&topic).await;
            if items.len() >= self.policy.min_cached_items {
                info!(topic = %topic, count = items.len(), "serving from cache");
                counter!("gallery_cache_served_total").increment(1);
                return Ok(ResolutionResult {
                    topic,
                    items,
                    served_from_cache: true,
                    warning: None,
                });
            }
            debug!(
                topic = %topic,
                count = items.len(),
                threshold = self.policy.min_cached_items,
                "cache below threshold, fetching live"
            );
            cached = Some(items);
        }

        let freshness = Freshness::for_request(req.force_fresh);
        match self.fetch_live(&topic, freshness).await {
            Ok(mut items) => {
                if req.force_fresh && self.policy.shuffle_fresh_results {
                    shuffle(&mut items);
                }
                self.spawn_write_through(&topic, items.clone());
                Ok(ResolutionResult {
                    topic,
                    items,
                    served_from_cache: false,
                    warning: None,
                })
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "live fetch failed, falling back to cache");
                counter!("gallery_fallback_total").increment(1);

                let mut items = match cached {
                    Some(items) => items,
                    None => self.read_cache(&topic).await,
                };
                if items.is_empty() {
                    error!(topic = %topic, cause = %e, "no cached items to fall back on");
                    return Err(GalleryError::NoContentAvailable { topic });
                }
                if req.force_fresh {
                    shuffle(&mut items);
                }
                Ok(ResolutionResult {
                    topic,
                    items,
                    served_from_cache: true,
                    warning: Some(FALLBACK_WARNING.to_string()),
                })
            }
        }
    }

    // Cache failures degrade to an empty result.
    async fn read_cache(&self, topic: &str) -> Vec<Item> {
        match self.cache.list(topic, self.policy.cache_read_limit).await {
            Ok(items) => items,
            Err(e) => {
                warn!(topic = %topic, store = self.cache.name(), error = %e, "cache read failed");
                counter!("gallery_cache_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn fetch_live(&self, topic: &str, freshness: Freshness) -> Result<Vec<Item>, GalleryError> {
        let provider = self.live.name();
        counter!("gallery_live_fetch_total", "provider" => provider).increment(1);

        let t0 = Instant::now();
        let limit = Duration::from_millis(self.policy.live_timeout_ms);
        let outcome = tokio::time::timeout(limit, self.live.fetch(topic, freshness)).await;
        histogram!("gallery_live_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                counter!("gallery_live_errors_total", "provider" => provider).increment(1);
                return Err(e);
            }
            Err(_) => {
                counter!("gallery_live_errors_total", "provider" => provider).increment(1);
                return Err(GalleryError::LiveSourceUnavailable(format!(
                    "{provider} gave no answer within {} ms",
                    self.policy.live_timeout_ms
                )));
            }
        };

        let received = raw.len();
        let (items, report) = normalize_entries(raw, topic, freshness, &self.rules);
        counter!("gallery_entries_filtered_total").increment(report.filtered() as u64);
        info!(
            topic = %topic,
            provider,
            received,
            kept = report.kept,
            off_host = report.off_host,
            unknown_tier = report.unknown_tier,
            short_caption = report.short_caption,
            fresh = freshness.is_fresh(),
            "live batch normalized"
        );

        if items.is_empty() {
            counter!("gallery_live_errors_total", "provider" => provider).increment(1);
            return Err(GalleryError::LiveSourceUnavailable(format!(
                "{provider} returned no usable entries ({received} received)"
            )));
        }
        Ok(items)
    }

    /// Detached write; the response path never awaits it.
    fn spawn_write_through(&self, topic: &str, items: Vec<Item>) {
        let cache = Arc::clone(&self.cache);
        let topic = topic.to_string();
        tokio::spawn(async move {
            let count = items.len();
            match cache.store(&topic, items).await {
                Ok(stored) => {
                    info!(topic = %topic, count, stored, store = cache.name(), "cache write-through done")
                }
                Err(e) => {
                    warn!(topic = %topic, count, store = cache.name(), error = %e, "cache write-through failed");
                    counter!("gallery_cache_write_errors_total").increment(1);
                }
            }
        });
    }
}
