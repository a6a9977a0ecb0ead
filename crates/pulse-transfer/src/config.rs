//! Engine-facing transfer settings.

use std::time::Duration;

use pulse_core::config::{ClientConfig, DEFAULT_CHUNK_SIZE};
use pulse_core::crypto::{NONCE_SIZE, TAG_SIZE};
use pulse_core::wire::{HEADER_LEN, MAX_PAYLOAD};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETRIES: u32 = 3;

/// Largest chunk whose sealed frame still fits one 16 MiB WebSocket frame.
pub const MAX_CHUNK_SIZE: usize = MAX_PAYLOAD - HEADER_LEN - NONCE_SIZE - TAG_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Plaintext bytes per `Chunk` message.
    pub chunk_size: usize,
    /// Wait for the receiver, and deadline for each individual read.
    pub timeout: Duration,
    /// Connection attempts before giving up.
    pub retries: u32,
    pub debug: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            debug: false,
        }
    }
}

impl TransferConfig {
    /// Replace zero values with defaults and cap the chunk size at
    /// [`MAX_CHUNK_SIZE`].
    pub fn normalized(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        self.chunk_size = self.chunk_size.min(MAX_CHUNK_SIZE);
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.retries == 0 {
            self.retries = DEFAULT_RETRIES;
        }
        self
    }
}

impl From<&ClientConfig> for TransferConfig {
    fn from(client: &ClientConfig) -> Self {
        TransferConfig {
            chunk_size: client.chunk_size,
            timeout: client.timeout(),
            retries: client.retries,
            debug: client.debug,
        }
        .normalized()
    }
}
