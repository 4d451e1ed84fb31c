//! Relay Output Host
//!
//! Serves the stream-control API and plays every stream it is told to start.
//!
//! Usage: `relay-output [--list-devices] [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    api,
    audio::device::list_devices,
    config::AppConfig,
    hosts::{self, OutputHost},
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

    let mut args = std::env::args().skip(1).peekable();
    if args.peek().map(String::as_str) == Some("--list-devices") {
        println!("\n=== Available Output Devices ===");
        for device in list_devices().into_iter().filter(|d| d.is_output) {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}", device.name, default_marker);
            println!("    ID: {}", device.id);
        }
        return Ok(());
    }

    let config_path = args.next().map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;
    let output = &config.output;

    tracing::info!(
        "Starting relay output host on {} (device: {})",
        output.control_bind,
        output.device.as_deref().unwrap_or("default")
    );

    let sink = hosts::sink_factory(output.device.as_deref(), config.stream, output.buffer_chunks);
    let host = Arc::new(OutputHost::new(sink, config.network.clone()));

    api::serve(output.control_bind, api::output::router(host.clone()), async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await?;

    // receivers release their playback devices before the process exits
    tokio::task::spawn_blocking(move || host.shutdown()).await?;

    Ok(())
}
