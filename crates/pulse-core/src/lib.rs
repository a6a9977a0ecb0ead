//! pulse-core: protocol messages, wire format, cipher channel and config.
//! The transfer engine and the relay both depend on this one.

pub mod config;
pub mod crypto;
pub mod message;
pub mod wire;

pub use crypto::{CryptoError, SessionKey};
pub use message::{Message, MessageType, Metadata};
pub use wire::CodecError;

/// First eight characters of a session token, for log output.
pub fn short_token(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
