//! Pulse integration test harness.
//!
//! Every test binds its own relay to 127.0.0.1:0 and drives real endpoints
//! over WebSockets, so tests never share rooms or ports.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pulse_core::crypto::SessionKey;
use pulse_relay::{RelayState, RoomRegistry};
use pulse_transfer::link::{self, ws_endpoint};
use pulse_transfer::{Receiver, Sender, TransferConfig};

mod failures;
mod relay;
mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct TestRelay {
    pub addr: SocketAddr,
    pub registry: Arc<RoomRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl TestRelay {
    pub async fn start() -> Result<Self> {
        Self::start_with(None).await
    }

    /// Start a relay that serves pages from `static_dir`.
    pub async fn start_with(static_dir: Option<PathBuf>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind relay")?;
        let addr = listener.local_addr()?;

        let registry = Arc::new(RoomRegistry::default());
        let shutdown = CancellationToken::new();
        let mut state = RelayState::new(registry.clone(), shutdown.clone());
        state.static_dir = static_dir;

        let task = tokio::spawn(pulse_relay::serve(listener, state));
        Ok(Self {
            addr,
            registry,
            shutdown,
            task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn endpoint(&self, token: &str) -> String {
        ws_endpoint(&self.ws_url(), token)
    }

    /// Poll until the relay holds `n` participants in total.
    pub async fn wait_for_participants(&self, n: usize) -> Result<()> {
        for _ in 0..200 {
            if self.registry.participant_count() == n {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bail!(
            "relay has {} participants, expected {n}",
            self.registry.participant_count()
        )
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
    }
}

/// A fresh session on `relay`: token, key, and an engine config that fails
/// fast instead of waiting minutes.
pub struct TestSession {
    pub relay_url: String,
    pub token: String,
    pub key: SessionKey,
    pub config: TransferConfig,
}

impl TestSession {
    pub fn new(relay: &TestRelay) -> Self {
        Self {
            relay_url: relay.ws_url(),
            token: link::generate_token(),
            key: SessionKey::generate(),
            config: TransferConfig {
                chunk_size: 65_536,
                timeout: Duration::from_secs(10),
                retries: 1,
                debug: false,
            },
        }
    }

    pub fn sender(&self) -> Sender {
        Sender::new(
            self.relay_url.clone(),
            self.token.clone(),
            self.key.clone(),
            self.config.clone(),
        )
    }

    pub fn receiver(&self) -> Receiver {
        Receiver::new(
            self.relay_url.clone(),
            self.token.clone(),
            self.key.clone(),
            self.config.clone(),
        )
    }
}

/// Connect the sender first, wait until the relay has seated it, then
/// connect the receiver so its `Ready` reaches the sender.
pub async fn pair(relay: &TestRelay, session: &TestSession) -> Result<(Sender, Receiver)> {
    let before = relay.registry.participant_count();
    let mut sender = session.sender();
    sender.connect().await.context("sender connect")?;
    relay.wait_for_participants(before + 1).await?;

    let mut receiver = session.receiver();
    receiver.connect().await.context("receiver connect")?;
    relay.wait_for_participants(before + 2).await?;
    Ok((sender, receiver))
}

/// Deterministic non-repeating-ish content of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Names of the entries in `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
