//! Frame transports: the ordered, reliable pipe between an endpoint and
//! the relay.
//!
//! The engine only ever sees [`FrameTransport`]: one opaque binary frame in,
//! one out, in order. [`WsConnector`] opens real relay connections;
//! [`memory_pair`] wires two endpoints together in-process.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{TransferError, TransportError};

/// One bidirectional, ordered frame pipe.
#[async_trait]
pub trait FrameTransport: Send {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Next frame from the peer. `Closed` once the pipe has ended.
    async fn recv_frame(&mut self) -> Result<Bytes, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens a [`FrameTransport`] to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, TransportError>;
}

// ── Retry ─────────────────────────────────────────────────────────────────────

/// Wait before the attempt that follows `attempt` (zero-based).
pub fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(2 * (u64::from(attempt) + 1))
}

/// Try `connector` up to `retries` times, sleeping [`backoff_for`] between
/// attempts. Exhaustion yields `Connection` carrying the last failure.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    url: &str,
    retries: u32,
) -> Result<Box<dyn FrameTransport>, TransferError> {
    let attempts = retries.max(1);
    let mut last = TransportError::Closed;

    for attempt in 0..attempts {
        match connector.connect(url).await {
            Ok(transport) => {
                tracing::debug!(attempt = attempt + 1, "connected to relay");
                return Ok(transport);
            }
            Err(TransportError::RoomFull) => return Err(TransferError::RoomFull),
            Err(e) => {
                tracing::warn!(attempt = attempt + 1, attempts, error = %e, "relay connect failed");
                last = e;
            }
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(backoff_for(attempt)).await;
        }
    }

    Err(TransferError::Connection { attempts, last })
}

// ── WebSocket ─────────────────────────────────────────────────────────────────

/// Connects to the relay over `ws://` or `wss://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, TransportError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| TransportError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.stream
            .send(WsMessage::Binary(frame))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv_frame(&mut self) -> Result<Bytes, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(match frame {
                        Some(f) if f.code == CloseCode::Policy => TransportError::RoomFull,
                        _ => TransportError::Closed,
                    });
                }
                // Text is not part of the protocol; pings are answered by tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Recv(e.to_string())),
                None => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Frames buffered per direction by [`memory_pair`].
const MEMORY_QUEUE: usize = 256;

/// One end of an in-process frame pipe.
pub struct MemoryTransport {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

/// Two connected in-memory transports. Frames sent on one arrive, in order,
/// on the other.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel(MEMORY_QUEUE);
    let (b_tx, a_rx) = mpsc::channel(MEMORY_QUEUE);
    (
        MemoryTransport {
            tx: Some(a_tx),
            rx: a_rx,
        },
        MemoryTransport {
            tx: Some(b_tx),
            rx: b_rx,
        },
    )
}

#[async_trait]
impl FrameTransport for MemoryTransport {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn recv_frame(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Hands out one pre-built transport, then refuses further connects.
pub struct OnceConnector {
    transport: Mutex<Option<Box<dyn FrameTransport>>>,
}

impl OnceConnector {
    pub fn new(transport: impl FrameTransport + 'static) -> Self {
        Self {
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }
}

#[async_trait]
impl Connector for OnceConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, TransportError> {
        let taken = self
            .transport
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        taken.ok_or_else(|| TransportError::Connect {
            url: url.to_string(),
            reason: "transport already taken".into(),
        })
    }
}
