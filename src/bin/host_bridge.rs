//! Headless brain host for stdin/stdout JSON communication.
//!
//! Reads `CommandEnvelope` messages as newline-delimited JSON from stdin,
//! routes them to the brain, and writes `ResponseEnvelope` and ability
//! `EventEnvelope` messages to stdout.
//!
//! Usage: `brain-host [CONFIG_PATH]`. Without a path the default config file
//! is used when it exists.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use brain::abilities::{MemoryPressure, memory_pressure};
use brain::host::stdio::run_stdio_bridge;
use brain::{AbilityOptions, Brain, BrainConfig, BroadcastEventSink};
use std::path::PathBuf;
use std::sync::Arc;

fn load_config() -> anyhow::Result<BrainConfig> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(BrainConfig::default_config_path);

    if explicit.is_none() && !path.exists() {
        tracing::info!(path = %path.display(), "no config file; using defaults");
        return Ok(BrainConfig::default());
    }

    let config = BrainConfig::from_file(&path)
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "config loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("brain-host starting");

    let config = load_config()?;
    let sink = Arc::new(BroadcastEventSink::new(config.host.event_capacity));
    let events = sink.subscribe();
    let brain = Arc::new(Brain::new(sink.clone(), config.clone()));

    brain.register(
        memory_pressure::NAME,
        Arc::new(MemoryPressure::new(sink, config.memory_pressure.clone())),
        AbilityOptions { auto_start: true },
    )?;

    run_stdio_bridge(brain, events).await.map_err(|e| {
        tracing::error!(error = %e, "brain-host exited with error");
        anyhow::anyhow!("brain-host failed: {e}")
    })?;

    tracing::info!("brain-host shut down cleanly");
    Ok(())
}
