//! pulse: end-to-end encrypted file transfer through a Pulse relay.

mod args;
mod cmd;
mod history;

use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pulse_core::config::{PulseConfig, DEFAULT_RELAY_URL};

fn print_usage() {
    println!("Usage: pulse [options] <command>");
    println!();
    println!("Commands:");
    println!("  send <file> [file2 ...]   Send one or more files");
    println!("  receive [dir]             Receive files into dir (default: .)");
    println!("  history                   Show transfer history");
    println!("  status                    Show relay health and room counts");
    println!();
    println!("Options:");
    println!("  --relay <url>       Relay server URL (default: {DEFAULT_RELAY_URL})");
    println!("  --join <link>       receive: join a link printed by `pulse send`");
    println!("  --chunk-size <n>    Chunk size in bytes (default: 65536)");
    println!("  --timeout <d>       Wait timeout, e.g. 90s or 5m (default: 5m)");
    println!("  --retries <n>       Connection attempts (default: 3)");
    println!("  --debug             Enable debug logging");
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("pulse=debug,pulse_transfer=debug,pulse_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let parsed = args::parse(&argv)?;

    let mut config = PulseConfig::load().context("failed to load config")?;
    parsed.overrides.apply(&mut config.client);
    init_tracing(config.client.debug);
    tracing::debug!(
        config = %PulseConfig::file_path().display(),
        relay = %config.client.relay_url,
        chunk_size = config.client.chunk_size,
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling transfer...");
                cancel.cancel();
            }
        });
    }

    let join = parsed.overrides.join.as_deref();
    let remaining: Vec<&str> = parsed.remaining.iter().map(String::as_str).collect();

    let result = match remaining.as_slice() {
        ["send", files @ ..] if !files.is_empty() && join.is_none() => {
            cmd::send::cmd_send(&config, files, &cancel).await
        }
        ["send", ..] if join.is_some() => {
            eprintln!("--join is only supported by `pulse receive`");
            std::process::exit(1);
        }
        ["send"] => {
            eprintln!("Usage: pulse send <file> [file2 file3 ...]");
            std::process::exit(1);
        }
        ["receive"] => cmd::receive::cmd_receive(&config, Path::new("."), join, &cancel).await,
        ["receive", dir] => cmd::receive::cmd_receive(&config, Path::new(dir), join, &cancel).await,
        ["history"] => cmd::history::cmd_history(&config.history),
        ["status"] => cmd::status::cmd_status(&config.client.relay_url).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("\n  ✗ Error: {e:#}\n");
        std::process::exit(1);
    }
    Ok(())
}
