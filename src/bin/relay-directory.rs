//! Relay Directory Service
//!
//! Tracks registered inputs and routes them to output hosts.
//!
//! Usage: `relay-directory [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    api,
    config::AppConfig,
    constants::TRIGGER_DISPLAY_WINDOW,
    directory::{DirectoryService, HttpOutputControl},
    trigger::TriggerHandler,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;
    let directory = &config.directory;

    tracing::info!("Starting relay directory on {}", directory.bind);
    for output in &directory.outputs {
        let hosts: Vec<String> = output.hosts.iter().map(ToString::to_string).collect();
        tracing::info!("Output '{}' -> {}", output.name, hosts.join(", "));
    }

    let control = Arc::new(HttpOutputControl::new(directory.control_timeout())?);
    let service = DirectoryService::spawn(directory, control);

    let triggers = Arc::new(TriggerHandler::from_config(
        &directory.triggers,
        reqwest::Client::new(),
        TRIGGER_DISPLAY_WINDOW,
    )?);

    let app = api::directory::router(service.registry().clone()).merge(api::trigger::router(triggers));
    api::serve(directory.bind, app, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await?;

    service.shutdown().await;
    Ok(())
}
