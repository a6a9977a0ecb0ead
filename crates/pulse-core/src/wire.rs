//! Pulse wire format: the plaintext layout of every protocol frame.
//!
//! ```text
//!   [tag u8] [len u32 BE] [payload: len bytes]
//! ```
//!
//! One frame carries exactly one message. The encoded bytes are what gets
//! encrypted; the relay only ever sees ciphertext. Decoding is strict: any
//! frame that is not exactly one well-formed message is rejected.

use std::borrow::Cow;

use bytes::Bytes;
use thiserror::Error;

use crate::message::{Message, MessageType, Metadata};

/// Tag byte plus big-endian payload length.
pub const HEADER_LEN: usize = 5;

/// Upper bound on any payload. Chunks are bounded by the negotiated chunk
/// size, which must stay below this.
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

// ── Encode ────────────────────────────────────────────────────────────────────

/// Encode a message into one frame.
pub fn encode(message: &Message) -> Vec<u8> {
    let payload: Cow<'_, [u8]> = match message {
        Message::Ready | Message::Complete => Cow::Borrowed(&[][..]),
        Message::Metadata(meta) => Cow::Owned(encode_metadata(meta)),
        Message::Chunk(data) => Cow::Borrowed(data.as_ref()),
        Message::Cancel(reason) | Message::Error(reason) => Cow::Borrowed(reason.as_bytes()),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(message.message_type() as u8);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

fn encode_metadata(meta: &Metadata) -> Vec<u8> {
    // Metadata only holds strings and integers; serialization cannot fail.
    serde_json::to_vec(meta).unwrap_or_default()
}

// ── Decode ────────────────────────────────────────────────────────────────────

/// Decode exactly one message from a frame.
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    if frame.is_empty() {
        return Err(CodecError::Empty);
    }
    if frame.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: frame.len(),
        });
    }

    let tag = frame[0];
    let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(CodecError::TooLarge(len));
    }

    let body = &frame[HEADER_LEN..];
    if body.len() < len {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN + len,
            actual: frame.len(),
        });
    }
    if body.len() > len {
        return Err(CodecError::TrailingBytes(body.len() - len));
    }

    let ty = MessageType::from_u8(tag).ok_or(CodecError::UnknownTag(tag))?;
    match ty {
        MessageType::Ready => empty(ty, body).map(|_| Message::Ready),
        MessageType::Complete => empty(ty, body).map(|_| Message::Complete),
        MessageType::Metadata => {
            let meta = serde_json::from_slice::<Metadata>(body).map_err(CodecError::Metadata)?;
            Ok(Message::Metadata(meta))
        }
        MessageType::Chunk => Ok(Message::Chunk(Bytes::copy_from_slice(body))),
        MessageType::Cancel => Ok(Message::Cancel(reason(body)?)),
        MessageType::Error => Ok(Message::Error(reason(body)?)),
    }
}

fn empty(ty: MessageType, body: &[u8]) -> Result<(), CodecError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(CodecError::UnexpectedPayload(ty))
    }
}

fn reason(body: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(body.to_vec()).map_err(|_| CodecError::Utf8)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("truncated frame: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{0} unexpected bytes after payload")]
    TrailingBytes(usize),

    #[error("unknown message type tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("{0:?} message must not carry a payload")]
    UnexpectedPayload(MessageType),

    #[error("invalid metadata payload: {0}")]
    Metadata(serde_json::Error),

    #[error("reason is not valid UTF-8")]
    Utf8,

    #[error("payload length {0} exceeds limit")]
    TooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
