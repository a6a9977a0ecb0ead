//! Sender state machine.
//!
//! ```text
//!   Disconnected → Connecting → Connected → AwaitingReceiverReady
//!     → SendingMetadata → StreamingChunks → AwaitingAck → Done
//! ```
//!
//! `Cancelled` and `Failed` are reachable from any state after `Connected`.
//! One file is streamed at a time; a batch repeats the file procedure over
//! the same connection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pulse_core::crypto::{ChecksumHasher, SessionKey};
use pulse_core::message::{self, Message, Metadata};

use crate::channel::SecureChannel;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::history::{self, HistoryEntry, HistorySink, TransferDirection};
use crate::link;
use crate::stats::{FileProgress, TransferStats};
use crate::transport::{connect_with_retry, Connector, WsConnector};

/// Reason carried by the `Cancel` message when the local user aborts.
pub const CANCEL_REASON: &str = "cancelled by sender";

/// MIME type for files whose extension is unknown.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const HASH_BUF: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Disconnected,
    Connecting,
    Connected,
    AwaitingReceiverReady,
    SendingMetadata,
    StreamingChunks,
    /// `Complete` has been sent for the current file.
    AwaitingAck,
    Done,
    Cancelled,
    Failed,
}

pub struct Sender {
    relay_url: String,
    token: String,
    key: SessionKey,
    config: TransferConfig,
    channel: Option<SecureChannel>,
    state: SenderState,
}

impl Sender {
    pub fn new(
        relay_url: impl Into<String>,
        token: impl Into<String>,
        key: SessionKey,
        config: TransferConfig,
    ) -> Self {
        Self {
            relay_url: relay_url.into(),
            token: token.into(),
            key,
            config: config.normalized(),
            channel: None,
            state: SenderState::Disconnected,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Connect to the relay over WebSocket, retrying with backoff.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.connect_with(&WsConnector).await
    }

    pub async fn connect_with(&mut self, connector: &dyn Connector) -> Result<(), TransferError> {
        self.state = SenderState::Connecting;
        let url = link::ws_endpoint(&self.relay_url, &self.token);

        match connect_with_retry(connector, &url, self.config.retries).await {
            Ok(transport) => {
                self.channel = Some(SecureChannel::new(transport, self.key.clone()));
                self.state = SenderState::Connected;
                tracing::info!(token = link::short_token(&self.token), "sender connected");
                Ok(())
            }
            Err(e) => {
                self.state = SenderState::Disconnected;
                Err(e)
            }
        }
    }

    /// Block until the receiver's `Ready` arrives. Anything else is fatal.
    pub async fn wait_for_receiver(&mut self, timeout: Duration) -> Result<(), TransferError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(not_connected());
        };
        self.state = SenderState::AwaitingReceiverReady;

        let result = match channel.recv_within(timeout).await {
            Ok(Message::Ready) => Ok(()),
            Ok(other) => Err(TransferError::violation(format!(
                "expected Ready, got {:?}",
                other.message_type()
            ))),
            Err(TransferError::ReadTimeout(_)) => Err(TransferError::ReceiverTimeout(timeout)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {
                self.state = SenderState::SendingMetadata;
                tracing::debug!("receiver ready");
            }
            Err(e) => {
                self.state = SenderState::Failed;
                tracing::warn!(error = %e, "waiting for receiver failed");
            }
        }
        result
    }

    /// Stream one file. `progress(bytes_sent, total)` runs after every chunk.
    pub async fn send_file<P>(
        &mut self,
        path: &Path,
        cancel: &CancellationToken,
        mut progress: P,
    ) -> Result<TransferStats, TransferError>
    where
        P: FnMut(u64, u64) + Send,
    {
        let mut report = |meta: &Metadata, done: u64| progress(done, meta.size);
        let (_, stats) = self.send_one(path, 0, 1, cancel, &mut report).await?;
        Ok(stats)
    }

    /// Send `paths` in order over this connection, stopping at the first
    /// failure. Each completed file is recorded in `sink` immediately.
    pub async fn send_batch<P>(
        &mut self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
        sink: &mut dyn HistorySink,
        mut progress: P,
    ) -> Result<Vec<TransferStats>, TransferError>
    where
        P: FnMut(&FileProgress<'_>) + Send,
    {
        let total = u32::try_from(paths.len())
            .map_err(|_| TransferError::violation("too many files in one batch"))?;
        let mut results = Vec::with_capacity(paths.len());

        for (index, path) in (0..total).zip(paths) {
            let mut report = |meta: &Metadata, done: u64| {
                progress(&FileProgress {
                    filename: &meta.filename,
                    index,
                    batch_total: total,
                    done,
                    size: meta.size,
                })
            };
            let (meta, stats) = self.send_one(path, index, total, cancel, &mut report).await?;
            history::record(
                sink,
                HistoryEntry::completed(TransferDirection::Send, &meta, &stats),
            );
            results.push(stats);
        }
        Ok(results)
    }

    async fn send_one(
        &mut self,
        path: &Path,
        batch_index: u32,
        batch_total: u32,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(&Metadata, u64) + Send),
    ) -> Result<(Metadata, TransferStats), TransferError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(not_connected());
        };

        let result = stream_file(
            channel,
            &mut self.state,
            path,
            (batch_index, batch_total),
            self.config.chunk_size,
            cancel,
            progress,
        )
        .await;

        self.state = match &result {
            Ok(_) => SenderState::Done,
            Err(TransferError::UserCancelled) => SenderState::Cancelled,
            Err(_) => SenderState::Failed,
        };
        if let Err(e) = &result {
            tracing::warn!(path = %path.display(), error = %e, "send failed");
        }
        result
    }

    /// Close the relay connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
    }
}

async fn stream_file(
    channel: &mut SecureChannel,
    state: &mut SenderState,
    path: &Path,
    (batch_index, batch_total): (u32, u32),
    chunk_size: usize,
    cancel: &CancellationToken,
    progress: &mut (dyn FnMut(&Metadata, u64) + Send),
) -> Result<(Metadata, TransferStats), TransferError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TransferError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

    // The checksum travels in Metadata, so the whole file is hashed first.
    let (size, checksum) = hash_file(path).await?;
    let meta = Metadata {
        filename,
        size,
        chunk_count: message::chunk_count(size, chunk_size),
        checksum,
        mime_type: mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME)
            .to_string(),
        batch_index,
        batch_total,
    };

    *state = SenderState::SendingMetadata;
    channel.send(&Message::Metadata(meta.clone())).await?;
    tracing::debug!(
        filename = %meta.filename,
        size = meta.size,
        chunks = meta.chunk_count,
        mime = %meta.mime_type,
        "metadata sent"
    );

    let mut file = File::open(path).await.map_err(|e| TransferError::io(path, e))?;
    let mut buf = vec![0u8; chunk_size];
    let started = Instant::now();
    let mut sent = 0u64;

    *state = SenderState::StreamingChunks;
    for _ in 0..meta.chunk_count {
        if cancel.is_cancelled() {
            if let Err(e) = channel.send(&Message::Cancel(CANCEL_REASON.into())).await {
                tracing::debug!(error = %e, "failed to deliver cancel");
            }
            tracing::info!(filename = %meta.filename, sent, "transfer cancelled");
            return Err(TransferError::UserCancelled);
        }

        let len = (meta.size - sent).min(chunk_size as u64) as usize;
        file.read_exact(&mut buf[..len])
            .await
            .map_err(|e| TransferError::io(path, e))?;
        channel
            .send(&Message::Chunk(Bytes::copy_from_slice(&buf[..len])))
            .await?;
        sent += len as u64;
        progress(&meta, sent);
    }

    *state = SenderState::AwaitingAck;
    channel.send(&Message::Complete).await?;

    let stats = TransferStats::new(started.elapsed(), sent);
    tracing::info!(
        filename = %meta.filename,
        bytes = sent,
        duration_ms = stats.duration.as_millis() as u64,
        "file sent"
    );
    Ok((meta, stats))
}

/// Size and hex SHA-256 of a file, read in fixed-size pieces.
async fn hash_file(path: &Path) -> Result<(u64, String), TransferError> {
    let mut file = File::open(path).await.map_err(|e| TransferError::io(path, e))?;
    let mut hasher = ChecksumHasher::new();
    let mut buf = vec![0u8; HASH_BUF];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(|e| TransferError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize()))
}

fn not_connected() -> TransferError {
    TransferError::violation("not connected to relay")
}
