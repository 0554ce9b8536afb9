//! MEV Sentinel service binary
//!
//! Loads configuration, wires the engine to the HTTP relay, and runs until
//! interrupted, logging a pipeline stats line once a second.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mev_sentinel::{HttpRelayClient, SentinelEngine};
use sentinel_config::SentinelConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("🚀 Starting MEV Sentinel...");

    let config_path = std::env::args().nth(1);
    let config = match &config_path {
        Some(path) => {
            info!("📂 Loading configuration from {path}");
            SentinelConfig::load(path).context("failed to load configuration")?
        }
        None => {
            info!("No configuration file given, using defaults");
            SentinelConfig::default()
        }
    };

    let relay =
        Arc::new(HttpRelayClient::new(&config.relay).context("failed to build relay client")?);
    info!("✅ Relay client targeting {}", config.relay.primary_url);

    let engine = Arc::new(SentinelEngine::new(config, relay)?);
    engine.start()?;
    info!("✅ MEV Sentinel initialized successfully");

    // Stats reporter; the engine threads do the real work.
    let stats_engine = Arc::clone(&engine);
    let reporter = std::thread::Builder::new()
        .name("sentinel-stats".to_string())
        .spawn(move || loop {
            std::thread::sleep(Duration::from_secs(1));
            let m = stats_engine.metrics();
            info!(
                "📊 seen={} rejected={} processed={} threats={} bundles={}/{} landed={} value=${:.2}",
                m.transactions_seen,
                m.transactions_rejected,
                m.transactions_processed,
                m.threats_detected,
                m.bundles_submitted,
                m.bundles_created,
                m.bundles_landed,
                m.value_protected_usd
            );
        })?;
    drop(reporter);

    wait_for_shutdown()?;
    info!("🛑 Shutdown signal received, stopping pipeline");
    engine.stop();
    Ok(())
}

fn wait_for_shutdown() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())?;
    Ok(())
}
