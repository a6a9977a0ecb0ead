//! pulse-relay: blind WebSocket relay that pairs two endpoints by token.
//!
//! The relay never holds a session key. It matches connections that present
//! the same token, forwards their binary frames verbatim, and closes rooms
//! that outlive the expiry policy.

pub mod handlers;
pub mod rooms;
pub mod socket;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::RelayState;
pub use rooms::{ExpiryPolicy, JoinError, Room, RoomRegistry};

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{token}", get(handlers::handle_ws))
        .route("/d/{token}", get(handlers::handle_receiver_page))
        .route("/u/{token}", get(handlers::handle_sender_page))
        .route("/health", get(handlers::handle_health))
        .route("/stats", get(handlers::handle_stats))
        .with_state(state)
        .layer(cors)
}

/// Serve the relay on `listener` until `state.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: RelayState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
