//! Receiver state machine.
//!
//! ```text
//!   Connected → SentReady → AwaitingMetadata → ReceivingChunks
//!     → VerifyingChecksum → Done
//! ```
//!
//! `Cancelled` and `Failed` are reachable from any state after `Connected`.
//!
//! Incoming bytes go to a hidden `.part` file next to the destination and
//! are hashed as they arrive. The destination path only appears once the
//! checksum has been verified; every other exit removes the part file.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use pulse_core::crypto::{ChecksumHasher, SessionKey};
use pulse_core::message::{Message, Metadata};

use crate::channel::SecureChannel;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::history::{self, HistoryEntry, HistorySink, TransferDirection};
use crate::link;
use crate::stats::{FileProgress, TransferStats};
use crate::transport::{connect_with_retry, Connector, WsConnector};

/// Reason carried by the `Cancel` message when the local user aborts.
pub const CANCEL_REASON: &str = "cancelled by receiver";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Disconnected,
    Connecting,
    Connected,
    SentReady,
    AwaitingMetadata,
    ReceivingChunks,
    VerifyingChecksum,
    Done,
    Cancelled,
    Failed,
}

pub struct Receiver {
    relay_url: String,
    token: String,
    key: SessionKey,
    config: TransferConfig,
    channel: Option<SecureChannel>,
    state: ReceiverState,
}

impl Receiver {
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
            state: ReceiverState::Disconnected,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Connect over WebSocket and announce readiness.
    pub async fn connect(&mut self) -> Result<(), TransferError> {
        self.connect_with(&WsConnector).await
    }

    /// Connect with retry, then immediately send `Ready`.
    pub async fn connect_with(&mut self, connector: &dyn Connector) -> Result<(), TransferError> {
        self.state = ReceiverState::Connecting;
        let url = link::ws_endpoint(&self.relay_url, &self.token);

        let transport = match connect_with_retry(connector, &url, self.config.retries).await {
            Ok(transport) => transport,
            Err(e) => {
                self.state = ReceiverState::Disconnected;
                return Err(e);
            }
        };
        let mut channel = SecureChannel::new(transport, self.key.clone());
        self.state = ReceiverState::Connected;

        if let Err(e) = channel.send(&Message::Ready).await {
            self.state = ReceiverState::Failed;
            return Err(e);
        }
        self.channel = Some(channel);
        self.state = ReceiverState::SentReady;
        tracing::info!(token = link::short_token(&self.token), "receiver connected, sent ready");
        Ok(())
    }

    /// Receive one file into `dest_dir`. Returns the saved path.
    pub async fn receive_file<P>(
        &mut self,
        dest_dir: &Path,
        cancel: &CancellationToken,
        mut progress: P,
    ) -> Result<(PathBuf, TransferStats), TransferError>
    where
        P: FnMut(u64, u64) + Send,
    {
        let mut report = |meta: &Metadata, done: u64| progress(done, meta.size);
        let received = self.receive_one(dest_dir, cancel, &mut report).await?;
        Ok((received.path, received.stats))
    }

    /// Receive files until the last one of the sender's batch completes.
    /// Each completed file is recorded in `sink` immediately; the first
    /// failure ends the batch.
    pub async fn receive_batch<P>(
        &mut self,
        dest_dir: &Path,
        cancel: &CancellationToken,
        sink: &mut dyn HistorySink,
        mut progress: P,
    ) -> Result<Vec<(PathBuf, TransferStats)>, TransferError>
    where
        P: FnMut(&FileProgress<'_>) + Send,
    {
        let mut results = Vec::new();
        loop {
            let mut report = |meta: &Metadata, done: u64| {
                progress(&FileProgress {
                    filename: &meta.filename,
                    index: meta.batch_index,
                    batch_total: meta.batch_total,
                    done,
                    size: meta.size,
                })
            };
            let received = self.receive_one(dest_dir, cancel, &mut report).await?;
            history::record(
                sink,
                HistoryEntry::completed(TransferDirection::Receive, &received.meta, &received.stats),
            );
            let last = received.meta.is_last_in_batch();
            results.push((received.path, received.stats));
            if last {
                return Ok(results);
            }
        }
    }

    async fn receive_one(
        &mut self,
        dest_dir: &Path,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(&Metadata, u64) + Send),
    ) -> Result<Received, TransferError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(TransferError::violation("not connected to relay"));
        };

        let result = receive_into(
            channel,
            &mut self.state,
            dest_dir,
            &self.config,
            cancel,
            progress,
        )
        .await;

        self.state = match &result {
            Ok(_) => ReceiverState::Done,
            Err(e) if e.is_cancellation() => ReceiverState::Cancelled,
            Err(_) => ReceiverState::Failed,
        };

        if let Err(e) = &result {
            if matches!(e, TransferError::UserCancelled) {
                if let Err(send_err) = channel.send(&Message::Cancel(CANCEL_REASON.into())).await {
                    tracing::debug!(error = %send_err, "failed to deliver cancel");
                }
            }
            tracing::warn!(error = %e, "receive failed");
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

struct Received {
    path: PathBuf,
    meta: Metadata,
    stats: TransferStats,
}

/// The file currently being received.
struct Incoming {
    meta: Metadata,
    partial: PartialFile,
    hasher: ChecksumHasher,
    received: u64,
    started: Instant,
}

async fn receive_into(
    channel: &mut SecureChannel,
    state: &mut ReceiverState,
    dest_dir: &Path,
    config: &TransferConfig,
    cancel: &CancellationToken,
    progress: &mut (dyn FnMut(&Metadata, u64) + Send),
) -> Result<Received, TransferError> {
    *state = ReceiverState::AwaitingMetadata;
    let mut current: Option<Incoming> = None;

    loop {
        // Cancellation also interrupts a read that is still waiting.
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::UserCancelled),
            message = channel.recv_within(config.timeout) => message?,
        };

        match message {
            Message::Metadata(meta) => {
                if current.is_some() {
                    return Err(TransferError::violation("Metadata received mid-file"));
                }
                let name = safe_filename(&meta.filename)?;
                let partial = PartialFile::create(dest_dir.join(name)).await?;
                tracing::debug!(
                    filename = %meta.filename,
                    size = meta.size,
                    chunks = meta.chunk_count,
                    batch_index = meta.batch_index,
                    batch_total = meta.batch_total,
                    "metadata received"
                );
                *state = ReceiverState::ReceivingChunks;
                current = Some(Incoming {
                    meta,
                    partial,
                    hasher: ChecksumHasher::new(),
                    received: 0,
                    started: Instant::now(),
                });
            }

            Message::Chunk(data) => {
                let Some(incoming) = current.as_mut() else {
                    return Err(TransferError::violation("Chunk received before Metadata"));
                };
                incoming.received += data.len() as u64;
                if incoming.received > incoming.meta.size {
                    return Err(TransferError::violation(format!(
                        "received {} bytes, more than the declared {}",
                        incoming.received, incoming.meta.size
                    )));
                }
                incoming.partial.write(&data).await?;
                incoming.hasher.update(&data);
                progress(&incoming.meta, incoming.received);
            }

            Message::Complete => {
                let Some(incoming) = current.take() else {
                    return Err(TransferError::violation("Complete received before Metadata"));
                };
                *state = ReceiverState::VerifyingChecksum;
                return finish(incoming).await;
            }

            Message::Cancel(reason) => {
                tracing::info!(reason = %reason, "peer cancelled transfer");
                return Err(TransferError::PeerCancelled(reason));
            }

            Message::Error(reason) => {
                tracing::warn!(reason = %reason, "peer reported error");
                return Err(TransferError::PeerReported(reason));
            }

            Message::Ready => {
                return Err(TransferError::violation("unexpected Ready from sender"));
            }
        }
    }
}

/// Verify the finished file and move it into place.
async fn finish(incoming: Incoming) -> Result<Received, TransferError> {
    let Incoming {
        meta,
        partial,
        hasher,
        received,
        started,
    } = incoming;

    let actual = hasher.finalize();
    if !meta.checksum.is_empty() && !meta.checksum.eq_ignore_ascii_case(&actual) {
        tracing::warn!(filename = %meta.filename, "checksum mismatch, discarding file");
        return Err(TransferError::ChecksumMismatch {
            expected: meta.checksum,
            actual,
        });
    }
    if received != meta.size {
        return Err(TransferError::violation(format!(
            "received {received} bytes, expected {}",
            meta.size
        )));
    }

    let path = partial.commit().await?;
    let stats = TransferStats::new(started.elapsed(), received);
    tracing::info!(
        path = %path.display(),
        bytes = received,
        duration_ms = stats.duration.as_millis() as u64,
        "file received and verified"
    );
    Ok(Received { path, meta, stats })
}

/// Final path component of a peer-supplied filename.
fn safe_filename(name: &str) -> Result<String, TransferError> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return Err(TransferError::violation(format!("unusable filename {name:?}")));
    }
    Ok(last.to_string())
}

// ── Partial file ──────────────────────────────────────────────────────────────

/// Longest file name most filesystems accept, in bytes.
const MAX_NAME_LEN: usize = 255;

/// `.{name}.part`, with `name` cut short so the result stays within
/// [`MAX_NAME_LEN`].
fn part_name(name: &str) -> String {
    let mut end = name.len().min(MAX_NAME_LEN - ".".len() - ".part".len());
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!(".{}.part", &name[..end])
}

/// A file being written. Removed on drop unless committed.
struct PartialFile {
    part_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

impl PartialFile {
    async fn create(final_path: PathBuf) -> Result<Self, TransferError> {
        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let part_path = final_path.with_file_name(part_name(&name));
        let file = File::create(&part_path)
            .await
            .map_err(|e| TransferError::io(&part_path, e))?;
        Ok(Self {
            part_path,
            final_path,
            file: Some(file),
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let Some(file) = self.file.as_mut() else {
            return Err(TransferError::violation("write after commit"));
        };
        file.write_all(data)
            .await
            .map_err(|e| TransferError::io(&self.part_path, e))?;
        // No write may still be in flight if this guard is dropped.
        file.flush()
            .await
            .map_err(|e| TransferError::io(&self.part_path, e))
    }

    async fn commit(mut self) -> Result<PathBuf, TransferError> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .await
                .map_err(|e| TransferError::io(&self.part_path, e))?;
        }
        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|e| TransferError::io(&self.final_path, e))?;
        // Nothing left to remove.
        self.part_path = PathBuf::new();
        Ok(std::mem::take(&mut self.final_path))
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        self.file.take();
        if self.part_path.as_os_str().is_empty() {
            return;
        }
        match std::fs::remove_file(&self.part_path) {
            Ok(()) => tracing::debug!(path = %self.part_path.display(), "partial file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.part_path.display(), error = %e, "failed to remove partial file")
            }
        }
    }
}
