// src/gallery/providers/memory.rs
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GalleryError;
use crate::gallery::types::{CacheStore, Item};

/// Rows kept per topic unless configured otherwise.
pub const DEFAULT_ROWS_PER_TOPIC: usize = 1_000;
const MAX_ROWS_PER_TOPIC: usize = 10_000;

#[derive(Debug, Default)]
struct Rows {
    by_topic: HashMap<String, Vec<Item>>,
    next_id: u64,
}

/// In-process cache store, used when no backend is configured and in tests.
///
/// Rows are kept per topic in insertion order and listed newest first, like
/// the backend listing. Each stored row gets a store-wide id (`mem-{n}`), so
/// rows from different live batches never share an id. Writes skip items whose
/// image URL is already stored; the oldest rows are dropped past the cap.
#[derive(Debug)]
pub struct MemoryCacheStore {
    rows: Mutex<Rows>,
    cap: usize,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROWS_PER_TOPIC)
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            rows: Mutex::new(Rows::default()),
            cap: cap.clamp(1, MAX_ROWS_PER_TOPIC),
        }
    }

    /// Seed rows as-is (ids included), e.g. a pre-populated gallery.
    pub fn with_items(topic: &str, items: Vec<Item>) -> Self {
        let store = Self::new();
        store
            .rows
            .lock()
            .expect("memory cache poisoned")
            .by_topic
            .insert(topic.to_string(), items);
        store
    }

    pub fn count(&self, topic: &str) -> usize {
        self.rows
            .lock()
            .expect("memory cache poisoned")
            .by_topic
            .get(topic)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn list(&self, topic: &str, limit: usize) -> Result<Vec<Item>, GalleryError> {
        let rows = self.rows.lock().expect("memory cache poisoned");
        Ok(rows
            .by_topic
            .get(topic)
            .map(|v| v.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn store(&self, topic: &str, items: Vec<Item>) -> Result<usize, GalleryError> {
        let mut rows = self.rows.lock().expect("memory cache poisoned");
        let Rows { by_topic, next_id } = &mut *rows;
        let stored = by_topic.entry(topic.to_string()).or_default();

        let mut added = 0;
        for mut it in items {
            if stored.iter().any(|s| s.image_url == it.image_url) {
                continue;
            }
            *next_id += 1;
            it.id = format!("mem-{next_id}");
            stored.push(it);
            added += 1;
        }

        if stored.len() > self.cap {
            let excess = stored.len() - self.cap;
            stored.drain(0..excess);
        }
        Ok(added)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
