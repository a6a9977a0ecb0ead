//! pulse-relay: Pulse WebSocket relay daemon.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use pulse_core::config::PulseConfig;
use pulse_relay::RelayState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load config
    if let Err(e) = PulseConfig::write_default_if_missing(&PulseConfig::file_path()) {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PulseConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PulseConfig::default()
    });
    let relay = config.relay;
    tracing::info!(
        bind = %relay.bind,
        port = relay.port,
        room_ttl_secs = relay.room_ttl_secs,
        sweep_interval_secs = relay.sweep_interval_secs,
        expiry = ?relay.expiry,
        "pulse-relay starting"
    );

    // ── Shutdown ─────────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let state = RelayState::from_config(&relay, shutdown.clone());

    let expiry_task = tokio::spawn(
        state
            .registry
            .clone()
            .expiry_loop(relay.sweep_interval(), shutdown.clone()),
    );

    let addr = format!("{}:{}", relay.bind, relay.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let result = pulse_relay::serve(listener, state).await;

    shutdown.cancel();
    let _ = expiry_task.await;
    tracing::info!("pulse-relay stopped");
    result
}
