//! Error taxonomy for the transfer engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use pulse_core::crypto::CryptoError;
use pulse_core::wire::CodecError;

/// Failures of the underlying frame transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Recv(String),

    #[error("connection closed")]
    Closed,

    #[error("room full: session already has two participants")]
    RoomFull,
}

/// Every way a single file transfer can terminate unsuccessfully.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("could not connect after {attempts} attempts: {last}")]
    Connection {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("receiver did not become ready within {0:?}")]
    ReceiverTimeout(Duration),

    #[error("no message from peer within {0:?}")]
    ReadTimeout(Duration),

    #[error("frame failed authentication")]
    Authentication(#[source] CryptoError),

    #[error("malformed message")]
    Malformed(#[source] CodecError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("peer cancelled: {0}")]
    PeerCancelled(String),

    #[error("peer reported error: {0}")]
    PeerReported(String),

    #[error("transfer cancelled")]
    UserCancelled,

    #[error("room full: session already has two participants")]
    RoomFull,

    #[error(transparent)]
    Transport(TransportError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        TransferError::ProtocolViolation(msg.into())
    }

    /// True when the transfer ended because someone asked it to stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            TransferError::UserCancelled | TransferError::PeerCancelled(_)
        )
    }
}

impl From<TransportError> for TransferError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::RoomFull => TransferError::RoomFull,
            other => TransferError::Transport(other),
        }
    }
}
