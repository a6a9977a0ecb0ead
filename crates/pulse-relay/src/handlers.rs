//! HTTP handlers: WebSocket upgrade, browser pages, and relay status.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use pulse_core::config::RelayConfig;
use pulse_core::crypto::{NONCE_SIZE, TAG_SIZE};
use pulse_core::short_token;
use pulse_core::wire::{HEADER_LEN, MAX_PAYLOAD};

use crate::rooms::RoomRegistry;
use crate::socket;

/// Longest token accepted in a route.
pub const MAX_TOKEN_LEN: usize = 128;

/// Largest WebSocket message a client may send: one sealed maximum frame.
pub const MAX_MESSAGE_SIZE: usize = NONCE_SIZE + HEADER_LEN + MAX_PAYLOAD + TAG_SIZE;

#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<RoomRegistry>,
    /// Directory holding receiver.html and sender.html.
    pub static_dir: Option<PathBuf>,
    /// Cancelled on relay shutdown; every connection holds a child token.
    pub shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(registry: Arc<RoomRegistry>, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            static_dir: None,
            shutdown,
        }
    }

    pub fn from_config(config: &RelayConfig, shutdown: CancellationToken) -> Self {
        let static_dir = (!config.static_dir.as_os_str().is_empty())
            .then(|| config.static_dir.clone());
        Self {
            registry: Arc::new(RoomRegistry::from_config(config)),
            static_dir,
            shutdown,
        }
    }
}

/// Tokens are URL path segments: ASCII letters, digits, `-` and `_`.
pub fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// ── /ws/{token} ───────────────────────────────────────────────────────────────

pub async fn handle_ws(
    State(state): State<RelayState>,
    Path(token): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !valid_token(&token) {
        return (StatusCode::BAD_REQUEST, "invalid session token").into_response();
    }
    tracing::debug!(token = short_token(&token), "websocket upgrade");

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .max_frame_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |ws| socket::relay_connection(ws, token, state))
}

// ── /d/{token}, /u/{token} ────────────────────────────────────────────────────

pub async fn handle_receiver_page(
    State(state): State<RelayState>,
    Path(token): Path<String>,
) -> Response {
    serve_page(&state, &token, "receiver.html").await
}

pub async fn handle_sender_page(
    State(state): State<RelayState>,
    Path(token): Path<String>,
) -> Response {
    serve_page(&state, &token, "sender.html").await
}

async fn serve_page(state: &RelayState, token: &str, page: &str) -> Response {
    if !valid_token(token) {
        return (StatusCode::BAD_REQUEST, "invalid session token").into_response();
    }
    let Some(dir) = &state.static_dir else {
        return (StatusCode::NOT_FOUND, "page not found").into_response();
    };

    match tokio::fs::read_to_string(dir.join(page)).await {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::warn!(page, error = %e, "failed to read static page");
            (StatusCode::NOT_FOUND, "page not found").into_response()
        }
    }
}

// ── /health ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ── /stats ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatsResponse {
    pub rooms: usize,
    pub participants: usize,
}

pub async fn handle_stats(State(state): State<RelayState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        rooms: state.registry.room_count(),
        participants: state.registry.participant_count(),
    })
}
