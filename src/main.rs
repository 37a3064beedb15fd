//! Gallery Resolver: binary entrypoint.
//! Boots the Axum HTTP server with the resolver, search pass-through and metrics.

use gallery_resolver::{app, Settings};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON lines when `GALLERY_LOG_JSON=1`.
/// Shuttle may already own the global subscriber, so failures are ignored.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gallery_resolver=info,warn"));

    let json = std::env::var("GALLERY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let settings = Settings::load()?;
    let router = app(&settings)?;

    tracing::info!("gallery resolver ready");
    Ok(router.into())
}
