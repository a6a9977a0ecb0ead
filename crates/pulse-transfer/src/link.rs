//! Session tokens and share links.
//!
//! A share link looks like `https://relay.example/d/<token>#<key>`. The
//! fragment carries the session key and is never sent to the relay.

use rand::RngCore;
use thiserror::Error;

use pulse_core::crypto::{CryptoError, SessionKey};

/// Random bytes in a session token (hex doubles the length).
pub const TOKEN_BYTES: usize = 16;

/// 128-bit random token, lower-case hex.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Which page the link opens on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `/d/`: the peer downloads what this endpoint sends.
    Download,
    /// `/u/`: the peer uploads to this endpoint.
    Upload,
}

impl LinkKind {
    fn segment(self) -> &'static str {
        match self {
            LinkKind::Download => "d",
            LinkKind::Upload => "u",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "d" => Some(LinkKind::Download),
            "u" => Some(LinkKind::Upload),
            _ => None,
        }
    }
}

pub use pulse_core::short_token;

/// WebSocket endpoint for `token` on `relay_url`.
pub fn ws_endpoint(relay_url: &str, token: &str) -> String {
    format!("{}/ws/{}", relay_url.trim_end_matches('/'), token)
}

/// Browser-facing base URL for a relay: `wss` becomes `https`, `ws` becomes
/// `http`.
pub fn http_base(relay_url: &str) -> String {
    let base = relay_url.trim_end_matches('/');
    if let Some(rest) = base.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = base.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        base.to_string()
    }
}

pub fn share_url(relay_url: &str, kind: LinkKind, token: &str, key: &SessionKey) -> String {
    format!(
        "{}/{}/{}#{}",
        http_base(relay_url),
        kind.segment(),
        token,
        key.to_base64()
    )
}

/// Everything needed to join a session from its share link.
#[derive(Debug, Clone)]
pub struct ShareLink {
    pub kind: LinkKind,
    /// Relay base in `ws://` / `wss://` form.
    pub relay_url: String,
    pub token: String,
    pub key: SessionKey,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link has no key fragment")]
    MissingKey,

    #[error("link key is invalid: {0}")]
    Key(#[from] CryptoError),

    #[error("unsupported link scheme (expected http or https)")]
    Scheme,

    #[error("link path must end in /d/<token> or /u/<token>")]
    Path,
}

/// Inverse of [`share_url`].
pub fn parse_share_url(url: &str) -> Result<ShareLink, LinkError> {
    let (location, fragment) = url.trim().split_once('#').ok_or(LinkError::MissingKey)?;
    if fragment.is_empty() {
        return Err(LinkError::MissingKey);
    }
    let key = SessionKey::from_base64(fragment)?;

    let ws_location = if let Some(rest) = location.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = location.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(LinkError::Scheme);
    };

    let (head, token) = ws_location.rsplit_once('/').ok_or(LinkError::Path)?;
    let (relay_url, segment) = head.rsplit_once('/').ok_or(LinkError::Path)?;
    let kind = LinkKind::from_segment(segment).ok_or(LinkError::Path)?;
    if token.is_empty() || !relay_url.contains("://") || relay_url.ends_with("://") {
        return Err(LinkError::Path);
    }

    Ok(ShareLink {
        kind,
        relay_url: relay_url.to_string(),
        token: token.to_string(),
        key,
    })
}
