//! Protocol messages exchanged between the two endpoints of a session.
//!
//! Every message is encoded by [`crate::wire`], encrypted as one frame, and
//! forwarded blindly by the relay.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Type tag carried in the first byte of every encoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Ready = 0x01,
    Metadata = 0x02,
    Chunk = 0x03,
    Complete = 0x04,
    Cancel = 0x05,
    Error = 0x06,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ready),
            0x02 => Some(Self::Metadata),
            0x03 => Some(Self::Chunk),
            0x04 => Some(Self::Complete),
            0x05 => Some(Self::Cancel),
            0x06 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Describes one file. Sent once, before the first chunk of that file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub filename: String,
    /// Total plaintext size in bytes.
    pub size: u64,
    /// Number of `Chunk` messages that follow.
    #[serde(rename = "chunks")]
    pub chunk_count: u64,
    /// Hex SHA-256 of the full plaintext. Empty means "not declared".
    #[serde(default)]
    pub checksum: String,
    pub mime_type: String,
    /// Zero-based position of this file in its batch.
    #[serde(default)]
    pub batch_index: u32,
    #[serde(default = "default_batch_total")]
    pub batch_total: u32,
}

fn default_batch_total() -> u32 {
    1
}

impl Metadata {
    /// True if this is the final file of its batch.
    pub fn is_last_in_batch(&self) -> bool {
        self.batch_index + 1 >= self.batch_total
    }
}

/// Number of chunks needed to carry `size` bytes at `chunk_size` per chunk.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size.max(1) as u64;
    size.div_ceil(chunk_size)
}

/// One protocol message. Ordering is implied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Receiver → sender: ready to accept a transfer.
    Ready,
    Metadata(Metadata),
    /// Raw plaintext slice of the file, at most one chunk size long.
    Chunk(Bytes),
    /// Sender → receiver: every chunk of the current file has been sent.
    Complete,
    /// Either side aborts the transfer, with a human-readable reason.
    Cancel(String),
    /// Either side reports a failure, with a human-readable reason.
    Error(String),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Ready => MessageType::Ready,
            Message::Metadata(_) => MessageType::Metadata,
            Message::Chunk(_) => MessageType::Chunk,
            Message::Complete => MessageType::Complete,
            Message::Cancel(_) => MessageType::Cancel,
            Message::Error(_) => MessageType::Error,
        }
    }
}
