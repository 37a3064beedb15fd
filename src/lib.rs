// src/lib.rs
// Public library surface for the service binary, the CLI and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod gallery;
pub mod metrics;
pub mod search;

pub use crate::api::{create_router, AppState, ResolutionPayload};
pub use crate::config::Settings;
pub use crate::error::GalleryError;
pub use crate::gallery::types::{Item, ResolutionRequest, ResolutionResult};
pub use crate::gallery::Resolver;

use axum::Router;

/// Build the full in-process app (API + `/metrics`) from startup settings.
pub fn app(settings: &Settings) -> anyhow::Result<Router> {
    let metrics = crate::metrics::Metrics::init(settings.policy.min_cached_items)?;
    let state = AppState::from_settings(settings)?;
    Ok(create_router(state).merge(metrics.router()))
}
