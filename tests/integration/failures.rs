use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use pulse_core::crypto::{self, SessionKey};
use pulse_core::message::Message;
use pulse_core::wire;
use pulse_transfer::sender::CANCEL_REASON;
use pulse_transfer::{
    Connector, FrameTransport, ReceiverState, TransferError, TransportError, WsConnector,
};

use crate::*;

// ── Tampering transport ───────────────────────────────────────────────────────

/// Opens real relay connections but flips a byte in the plaintext of one
/// chunk before sealing it again, so the frame still authenticates.
struct TamperConnector {
    key: SessionKey,
    corrupt_chunk: usize,
}

struct TamperTransport {
    inner: Box<dyn FrameTransport>,
    key: SessionKey,
    corrupt_chunk: usize,
    chunks: usize,
}

#[async_trait]
impl Connector for TamperConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, TransportError> {
        let inner = WsConnector.connect(url).await?;
        Ok(Box::new(TamperTransport {
            inner,
            key: self.key.clone(),
            corrupt_chunk: self.corrupt_chunk,
            chunks: 0,
        }))
    }
}

#[async_trait]
impl FrameTransport for TamperTransport {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let plain = crypto::decrypt(&frame, &self.key).expect("own frame decrypts");
        let frame = match wire::decode(&plain).expect("own frame decodes") {
            Message::Chunk(data) => {
                let index = self.chunks;
                self.chunks += 1;
                if index == self.corrupt_chunk {
                    let mut data = data.to_vec();
                    data[0] ^= 0xff;
                    let forged = wire::encode(&Message::Chunk(Bytes::from(data)));
                    Bytes::from(crypto::encrypt(&forged, &self.key).expect("reseal"))
                } else {
                    frame
                }
            }
            _ => frame,
        };
        self.inner.send_frame(frame).await
    }

    async fn recv_frame(&mut self) -> Result<Bytes, TransportError> {
        self.inner.recv_frame().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// Content altered in transit (but correctly sealed) fails the checksum;
/// nothing is left on disk.
#[tokio::test]
async fn test_checksum_mismatch_discards_file() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let path = write_file(src.path(), "ledger.csv", &pattern(150_000));

    let mut sender = session.sender();
    sender
        .connect_with(&TamperConnector {
            key: session.key.clone(),
            corrupt_chunk: 1,
        })
        .await?;
    relay.wait_for_participants(1).await?;
    let mut receiver = session.receiver();
    receiver.connect().await?;

    let cancel = CancellationToken::new();
    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender.send_file(&path, &cancel, |_, _| {}).await
        },
        receiver.receive_file(dst.path(), &cancel, |_, _| {}),
    );

    // The sender cannot tell; it only streams.
    sent?;
    let err = received.unwrap_err();
    assert!(
        matches!(err, TransferError::ChecksumMismatch { .. }),
        "got {err:?}"
    );
    assert_eq!(receiver.state(), ReceiverState::Failed);
    assert!(dir_entries(dst.path()).is_empty());

    relay.stop().await;
    Ok(())
}

/// A receiver holding a different key cannot produce a `Ready` the sender
/// accepts.
#[tokio::test]
async fn test_wrong_key_fails_authentication() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);

    let mut sender = session.sender();
    sender.connect().await?;
    relay.wait_for_participants(1).await?;

    let mut intruder = Receiver::new(
        session.relay_url.clone(),
        session.token.clone(),
        SessionKey::generate(),
        session.config.clone(),
    );
    intruder.connect().await?;

    let err = sender
        .wait_for_receiver(Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Authentication(_)), "got {err:?}");

    relay.stop().await;
    Ok(())
}

/// Sender cancellation after the first chunk reaches the receiver as
/// `Cancel`, and the receiver removes its partial file.
#[tokio::test]
async fn test_sender_cancel_mid_stream() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let path = write_file(src.path(), "movie.mkv", &pattern(150_000));

    let (mut sender, mut receiver) = pair(&relay, &session).await?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let receiver_cancel = CancellationToken::new();

    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender
                .send_file(&path, &cancel, move |done, _| {
                    if done >= 65_536 {
                        trigger.cancel();
                    }
                })
                .await
        },
        receiver.receive_file(dst.path(), &receiver_cancel, |_, _| {}),
    );

    assert!(matches!(sent, Err(TransferError::UserCancelled)));
    match received {
        Err(TransferError::PeerCancelled(reason)) => assert_eq!(reason, CANCEL_REASON),
        other => panic!("expected PeerCancelled, got {other:?}"),
    }
    assert_eq!(receiver.state(), ReceiverState::Cancelled);
    assert!(dir_entries(dst.path()).is_empty());

    relay.stop().await;
    Ok(())
}

/// Nobody ever joins: the sender gives up after its timeout.
#[tokio::test]
async fn test_receiver_never_arrives() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);

    let mut sender = session.sender();
    sender.connect().await?;
    let err = sender
        .wait_for_receiver(Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::ReceiverTimeout(_)), "got {err:?}");

    relay.stop().await;
    Ok(())
}

/// Connecting to a port nobody listens on exhausts the retry budget.
#[tokio::test]
async fn test_unreachable_relay() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut sender = Sender::new(
        format!("ws://{addr}"),
        "nobody-home",
        SessionKey::generate(),
        TransferConfig {
            retries: 1,
            ..TransferConfig::default()
        },
    );
    let err = sender.connect().await.unwrap_err();
    assert!(
        matches!(err, TransferError::Connection { attempts: 1, .. }),
        "got {err:?}"
    );
    Ok(())
}
