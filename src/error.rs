// src/error.rs
use axum::http::StatusCode;
use thiserror::Error;

/// Failures the resolver and the search pass-through can report.
///
/// `CacheUnavailable` never reaches a caller of `Resolver::resolve`: it is
/// absorbed as "zero cached items". `LiveSourceUnavailable` only surfaces as a
/// warning when the cache fallback succeeds.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("live fetch unavailable: {0}")]
    LiveSourceUnavailable(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("no content available for topic '{topic}': live fetch failed and cache is empty")]
    NoContentAvailable { topic: String },

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },
}

impl GalleryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GalleryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GalleryError::LiveSourceUnavailable(_) | GalleryError::CacheUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            GalleryError::NoContentAvailable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GalleryError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// Map a transport error from the live provider, keeping timeouts recognizable in logs.
    pub(crate) fn live(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GalleryError::LiveSourceUnavailable(format!("timed out: {e}"))
        } else if e.is_decode() {
            GalleryError::LiveSourceUnavailable(format!("malformed response: {e}"))
        } else {
            GalleryError::LiveSourceUnavailable(e.to_string())
        }
    }

    pub(crate) fn cache(e: reqwest::Error) -> Self {
        GalleryError::CacheUnavailable(e.to_string())
    }
}
