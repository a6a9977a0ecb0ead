//! Per-connection pump between a WebSocket and its room.
//!
//! The reader half forwards every binary message to the room. The writer half
//! drains this connection's outbound queue. Either side stopping tears down
//! both and removes the connection from its room.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use pulse_core::short_token;

use crate::handlers::RelayState;
use crate::rooms::{JoinError, Participant};

/// Frames queued per connection before the forwarding peer waits.
const OUTBOUND_QUEUE: usize = 32;

/// Close reason sent to a connection rejected by a full room.
pub const ROOM_FULL_REASON: &str = "room full";

pub async fn relay_connection(ws: WebSocket, token: String, state: RelayState) {
    let (mut sink, mut stream) = ws.split();
    let id = state.registry.next_connection_id();
    let (tx, mut rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE);
    let closed = state.shutdown.child_token();

    let room = match state
        .registry
        .join(&token, Participant::new(id, tx, closed.clone()))
    {
        Ok(room) => room,
        Err(JoinError::RoomFull) => {
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: ROOM_FULL_REASON.into(),
                })))
                .await;
            return;
        }
    };

    // ── Writer ───────────────────────────────────────────────────────────────
    let writer = {
        let closed = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    frame = rx.recv() => match frame {
                        Some(frame) => {
                            if sink.send(Message::Binary(frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = closed.cancelled() => break,
                }
            }
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "session closed".into(),
                })))
                .await;
            let _ = sink.close().await;
        })
    };

    // ── Reader ───────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Binary(frame))) => {
                    room.forward(id, frame).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Text is not part of the protocol; pings are answered by axum.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(token = short_token(&token), error = %e, "websocket read failed");
                    break;
                }
            }
        }
    }

    state.registry.leave(&room, id);
    closed.cancel();
    let _ = writer.await;
}
