//! Relay Input Host
//!
//! Streams the configured capture devices and registers them with the
//! directory service.
//!
//! Usage: `relay-input [--list-devices] [config.toml]`

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    audio::device::list_devices,
    config::AppConfig,
    hosts::{self, InputHost},
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
        println!("\n=== Available Input Devices ===");
        for device in list_devices().into_iter().filter(|d| d.is_input) {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}", device.name, default_marker);
            println!("    ID: {}", device.id);
        }
        return Ok(());
    }

    let config_path = args.next().map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    tracing::info!("Starting relay input host, directory at {}", config.input.directory);

    let host = Arc::new(InputHost::new(&config.input, config.network.clone())?);

    if config.input.streams.is_empty() {
        tracing::warn!("No input streams configured");
    }
    for stream in &config.input.streams {
        let source = hosts::source_factory(&stream.device, config.stream);
        let id = host.add(stream.id.clone(), stream.name.clone(), source, stream.outputs.clone())?;

        // one broken device must not keep the others offline
        match host.start(&id) {
            Ok(addr) => tracing::info!("Input '{}' ({}) streaming on {}", stream.name, id, addr),
            Err(e) => tracing::error!("Input '{}' failed to start: {}", stream.name, e),
        }
    }

    host.spawn_registration();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    host.shutdown().await;

    Ok(())
}
