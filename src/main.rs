//! ChatHub - chat and presence relay between a Minecraft proxy and chat platforms
//!
//! Every enabled platform registers an adaptor with the event hub; chat and
//! join/leave/switch events seen on one platform are relayed to the others.

mod common;
mod config;
mod hub;
mod platforms;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info, warn};

use config::env::{apply_env_overrides, get_config_path};
use config::validate::validate_core;
use common::ConfigError;
use config::{ensure_config_file, load_config, Config, Policy};
use hub::EventHub;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("ChatHub v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    if ensure_config_file(&config_path)? {
        warn!("No configuration found, created {} with defaults", config_path);
    }
    info!("Loading configuration from {}...", config_path);

    let config = read_config(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    let policy = Arc::new(Policy::from_config(&config));
    info!("Configuration loaded successfully");
    info!("  Complete takeover: {}", policy.is_complete_takeover());
    info!("  Ignore patterns: {}", policy.snapshot().ignore_pattern_count());

    let adaptors = platforms::build_adaptors(&config, &policy);
    if adaptors.is_empty() {
        warn!("No platform enabled, nothing will be relayed");
    }

    let hub = EventHub::builder(Arc::clone(&policy))
        .queue_capacity(config.core.queue_capacity)
        .register_all(adaptors)
        .build();
    hub.start().await;

    let running = hub.running_platforms();
    info!(
        "Relaying between: {}",
        running
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    #[cfg(unix)]
    let reloader = tokio::spawn(reload_on_hangup(config_path.clone(), Arc::clone(&policy)));

    shutdown_signal().await;
    #[cfg(unix)]
    reloader.abort();
    info!("Shutting down...");
    hub.shutdown().await;
    info!("ChatHub stopped");

    Ok(())
}

/// Load the config file, apply environment overrides and validate the core section.
fn read_config(path: &str) -> Result<Config, ConfigError> {
    let config = apply_env_overrides(load_config(path)?);
    validate_core(&config)?;
    Ok(config)
}

/// Re-read the config file into the policy on every SIGHUP.
///
/// Adaptors keep the settings they were built with; only the policy
/// (ignore patterns, takeover mode, servernames, templates) changes.
#[cfg(unix)]
async fn reload_on_hangup(config_path: String, policy: Arc<Policy>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading {}", config_path);
        match read_config(&config_path) {
            Ok(config) => policy.reload(&config),
            Err(e) => error!("Reload failed, keeping current policy: {}", e),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
