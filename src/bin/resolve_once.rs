//! Resolve one topic from the command line and print the JSON payload.
//!
//! Usage: `resolve_once [topic] [--fresh]`

use std::time::Duration;

use gallery_resolver::{AppState, ResolutionPayload, ResolutionRequest, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let mut topic = None;
    let mut force_fresh = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--fresh" => force_fresh = true,
            _ => topic = Some(arg),
        }
    }

    let settings = Settings::load()?;
    let state = AppState::from_settings(&settings)?;
    let req = ResolutionRequest {
        topic: topic.clone(),
        force_fresh,
    };

    let payload = match state.resolver.resolve(req).await {
        Ok(res) => ResolutionPayload::from(res),
        Err(e) => ResolutionPayload::failure(topic.unwrap_or_default(), &e),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    // Give the detached cache write a moment before the runtime shuts down.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    Ok(())
}
