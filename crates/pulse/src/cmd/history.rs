//! `pulse history`: print recorded transfers as a table.

use anyhow::{Context, Result};

use pulse_core::config::HistoryConfig;
use pulse_transfer::stats::format_bytes;
use pulse_transfer::{HistoryEntry, TransferDirection};

use super::display;
use crate::history::JsonHistory;

const NAME_WIDTH: usize = 23;

pub fn cmd_history(config: &HistoryConfig) -> Result<()> {
    let history = JsonHistory::from_config(config);
    let entries = history
        .load()
        .with_context(|| format!("failed to read history from {}", history.path().display()))?;

    if entries.is_empty() {
        println!("No transfer history.");
        return Ok(());
    }

    display::banner(&format!("Transfer History ({})", entries.len()));
    println!(
        "  {:<19} | Dir | {:<23} | {:<9} | {:<11} | Status",
        "Time", "File", "Size", "Speed"
    );
    println!("  {}", "-".repeat(86));
    for entry in &entries {
        println!("  {}", format_row(entry));
    }
    println!();
    Ok(())
}

fn format_row(entry: &HistoryEntry) -> String {
    let arrow = match entry.direction {
        TransferDirection::Send => "↑",
        TransferDirection::Receive => "↓",
    };
    format!(
        "{:<19} |  {}  | {:<23} | {:<9} | {:<11} | {}",
        entry.time.format("%Y-%m-%d %H:%M:%S"),
        arrow,
        truncate_name(&entry.filename),
        format_bytes(entry.size),
        display::format_speed(entry.speed),
        entry.status
    )
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() <= NAME_WIDTH {
        return name.to_string();
    }
    let head: String = name.chars().take(NAME_WIDTH - 3).collect();
    format!("{head}...")
}
