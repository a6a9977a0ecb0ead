//! `pulse status`: relay health and room counts.

use anyhow::Result;
use serde::Deserialize;

use super::display;
use super::http::{base_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Deserialize)]
struct StatsResponse {
    rooms: usize,
    participants: usize,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(relay_url: &str) -> Result<()> {
    let base = base_url(relay_url);
    let health: HealthResponse = get_json(&format!("{base}/health")).await?;
    let stats: StatsResponse = get_json(&format!("{base}/stats")).await?;

    display::banner("Relay Status");
    println!("  Relay        : {base}");
    println!("  Health       : {}", health.status);
    println!("  Open rooms   : {}", stats.rooms);
    println!("  Participants : {}", stats.participants);
    println!();
    Ok(())
}
