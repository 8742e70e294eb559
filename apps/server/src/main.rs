//! BlueHarness Server - multi-protocol Bluetooth test endpoint.
//!
//! Composes the full service set behind one RPC listener and drives the
//! endpoint lifecycle: serve until a shutdown signal arrives, then stop
//! accepting calls, drain in-flight ones, and deinitialize every service.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use blueharness_core::{compose, PlatformContext, StaticAdapter};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// BlueHarness Server - Bluetooth test endpoint over HTTP/JSON RPC.
#[derive(Parser, Debug)]
#[command(name = "blueharness-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "BLUEHARNESS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "BLUEHARNESS_BIND_PORT")]
    port: Option<u16>,

    /// Adapter address to report (overrides config file).
    #[arg(short = 'a', long, env = "BLUEHARNESS_ADAPTER_ADDRESS")]
    adapter_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("BlueHarness Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(address) = args.adapter_address {
        config.adapter_address = address;
    }

    log::info!(
        "Configuration: bind_port={}, adapter={} ({}), {} profile(s)",
        config.bind_port,
        config.adapter_address,
        config.adapter_name,
        config.profiles.len()
    );

    // Build the platform context around the emulated adapter
    let adapter = StaticAdapter::arc(
        config.adapter_address.clone(),
        config.adapter_name.clone(),
        config.profiles.iter().copied(),
    );
    let ctx = Arc::new(PlatformContext::new(adapter));

    // Compose the endpoint: probe the audio role, construct every service,
    // register the union behind one router. Any failure here is fatal -
    // no listener starts and no partial service set is exposed.
    let composed = compose(&ctx).context("Failed to compose endpoint")?;
    log::info!("Composed services: {:?}", composed.service_names());

    // Bind and start accepting RPC calls
    let addr = SocketAddr::from(([0, 0, 0, 0], config.bind_port));
    let server = composed
        .serve(addr)
        .await
        .context("Failed to start RPC listener")?;

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: stop accepting, drain, then tear down services.
    server.shutdown();
    if let Err(e) = server.await_termination().await {
        log::error!("Listener terminated with error: {}", e);
    }
    let failures = server.deinit();
    for failure in &failures {
        log::error!("{}", failure);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
