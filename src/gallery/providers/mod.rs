// src/gallery/providers/mod.rs
pub mod backend;
pub mod memory;
pub mod scrapingbee;

pub use backend::{BackendCacheStore, BackendSettings};
pub use memory::MemoryCacheStore;
pub use scrapingbee::{ScraperSettings, ScrapingBeeSource};

pub(crate) const USER_AGENT: &str = concat!("gallery-resolver/", env!("CARGO_PKG_VERSION"));
