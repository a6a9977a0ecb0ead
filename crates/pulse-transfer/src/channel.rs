//! Encrypted message channel over a frame transport.
//!
//! Every outgoing message is encoded, sealed with a fresh nonce and sent as
//! one frame. Every incoming frame must authenticate and decode to exactly
//! one message, or the channel reports a fatal error.

use std::time::Duration;

use bytes::Bytes;

use pulse_core::crypto::{self, SessionKey};
use pulse_core::message::Message;
use pulse_core::wire;

use crate::error::{TransferError, TransportError};
use crate::transport::FrameTransport;

pub struct SecureChannel {
    transport: Box<dyn FrameTransport>,
    key: SessionKey,
}

impl SecureChannel {
    pub fn new(transport: Box<dyn FrameTransport>, key: SessionKey) -> Self {
        Self { transport, key }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), TransferError> {
        let sealed = crypto::encrypt(&wire::encode(message), &self.key)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.transport.send_frame(Bytes::from(sealed)).await?;
        Ok(())
    }

    /// Wait for the next message with no deadline.
    pub async fn recv(&mut self) -> Result<Message, TransferError> {
        let frame = self.transport.recv_frame().await?;
        let plaintext = crypto::decrypt(&frame, &self.key).map_err(TransferError::Authentication)?;
        wire::decode(&plaintext).map_err(TransferError::Malformed)
    }

    /// Wait for the next message, failing with `ReadTimeout` after `deadline`.
    pub async fn recv_within(&mut self, deadline: Duration) -> Result<Message, TransferError> {
        match tokio::time::timeout(deadline, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::ReadTimeout(deadline)),
        }
    }

    pub async fn close(&mut self) {
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "transport close failed");
        }
    }
}
