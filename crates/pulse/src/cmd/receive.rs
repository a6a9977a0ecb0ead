//! `pulse receive`: accept files into a directory.
//!
//! Without `--join` this opens a new session and prints an upload link for
//! a browser. With `--join <link>` it joins a session opened by
//! `pulse send` on another machine.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;

use pulse_core::config::PulseConfig;
use pulse_core::crypto::{generate_key, SessionKey};
use pulse_transfer::link::{self, LinkKind};
use pulse_transfer::stats::format_bytes;
use pulse_transfer::{Receiver, TransferConfig, TransferStats};

use super::display::{self, ProgressBar};
use crate::history::JsonHistory;

struct Session {
    relay_url: String,
    token: String,
    key: SessionKey,
}

/// Resolve which session to receive on.
fn session_for(config: &PulseConfig, join: Option<&str>) -> Result<Session> {
    match join {
        Some(url) => {
            let link = link::parse_share_url(url).context("invalid share link")?;
            if link.kind != LinkKind::Download {
                bail!("{url} is an upload link; open it in a browser to send files");
            }
            Ok(Session {
                relay_url: link.relay_url,
                token: link.token,
                key: link.key,
            })
        }
        None => Ok(Session {
            relay_url: config.client.relay_url.clone(),
            token: link::generate_token(),
            key: generate_key(),
        }),
    }
}

pub async fn cmd_receive(
    config: &PulseConfig,
    dest: &Path,
    join: Option<&str>,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("failed to create destination directory {}", dest.display()))?;
    let session = session_for(config, join)?;

    display::banner("Receive");
    println!("  Destination : {}", dest.display());
    println!();
    if join.is_some() {
        println!("  Joining session {}...", link::short_token(&session.token));
    } else {
        let url = link::share_url(&session.relay_url, LinkKind::Upload, &session.token, &session.key);
        println!("  {url}");
        println!();
        println!("  End-to-end encrypted. Waiting for sender...");
    }

    let mut receiver = Receiver::new(
        session.relay_url,
        session.token,
        session.key,
        TransferConfig::from(&config.client),
    );
    let mut history = JsonHistory::from_config(&config.history);

    let result = run(&mut receiver, dest, &mut history, cancel).await;
    receiver.close().await;
    let files = result?;

    println!();
    for (path, stats) in &files {
        println!("  ✓ Saved: {}", path.display());
        println!(
            "    {} in {} @ {}",
            format_bytes(stats.bytes_transferred),
            display::format_duration(stats.duration),
            display::format_speed(stats.average_speed)
        );
    }
    println!("  ✓ Checksum verified");
    println!();
    Ok(())
}

async fn run(
    receiver: &mut Receiver,
    dest: &Path,
    history: &mut JsonHistory,
    cancel: &CancellationToken,
) -> Result<Vec<(PathBuf, TransferStats)>> {
    receiver.connect().await.context("failed to connect to relay")?;

    let mut bar = ProgressBar::new();
    let result = receiver
        .receive_batch(dest, cancel, history, |p| bar.update(p))
        .await;
    bar.finish();
    Ok(result?)
}
