//! `pulse send`: open a session and stream files to whoever opens the link.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use pulse_core::config::PulseConfig;
use pulse_core::crypto::generate_key;
use pulse_transfer::link::{self, LinkKind};
use pulse_transfer::stats::format_bytes;
use pulse_transfer::{Sender, TransferConfig, TransferStats};

use super::display::{self, ProgressBar};
use crate::history::JsonHistory;

pub async fn cmd_send(config: &PulseConfig, files: &[&str], cancel: &CancellationToken) -> Result<()> {
    let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    let mut total_size = 0u64;
    for path in &paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("file not found: {}", path.display()))?;
        if !meta.is_file() {
            bail!("not a regular file: {}", path.display());
        }
        total_size += meta.len();
    }

    let token = link::generate_token();
    let key = generate_key();
    let url = link::share_url(&config.client.relay_url, LinkKind::Download, &token, &key);

    display::banner("Send");
    if let [single] = paths.as_slice() {
        let name = single.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("  File   : {} ({})", name, format_bytes(total_size));
    } else {
        println!("  Batch  : {} files ({} total)", paths.len(), format_bytes(total_size));
    }
    println!();
    println!("  {url}");
    println!();
    println!("  End-to-end encrypted. Waiting for receiver...");

    let mut sender = Sender::new(
        config.client.relay_url.clone(),
        token,
        key,
        TransferConfig::from(&config.client),
    );
    let mut history = JsonHistory::from_config(&config.history);

    let started = Instant::now();
    let result = run(&mut sender, &paths, &mut history, cancel).await;
    sender.close().await;
    let stats = result?;

    let bytes: u64 = stats.iter().map(|s| s.bytes_transferred).sum();
    let elapsed = started.elapsed();
    println!();
    println!(
        "  ✓ Done! ({} in {} @ {})",
        format_bytes(bytes),
        display::format_duration(elapsed),
        display::format_speed(TransferStats::new(elapsed, bytes).average_speed)
    );
    println!("  ✓ Checksum verified by receiver");
    println!();
    Ok(())
}

async fn run(
    sender: &mut Sender,
    paths: &[PathBuf],
    history: &mut JsonHistory,
    cancel: &CancellationToken,
) -> Result<Vec<TransferStats>> {
    sender.connect().await.context("failed to connect to relay")?;

    let timeout = sender.config().timeout;
    tokio::select! {
        result = sender.wait_for_receiver(timeout) => {
            result.context("receiver did not connect")?;
        }
        _ = cancel.cancelled() => bail!("cancelled while waiting for receiver"),
    }
    println!("  ✓ Connected!");
    println!();

    let mut bar = ProgressBar::new();
    let result = sender
        .send_batch(paths, cancel, history, |p| bar.update(p))
        .await;
    bar.finish();
    Ok(result?)
}
