use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pulse_transfer::TransferError;

use crate::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn client(relay: &TestRelay, token: &str) -> Result<Client> {
    let (ws, _) = connect_async(relay.endpoint(token)).await?;
    Ok(ws)
}

async fn next_message(ws: &mut Client) -> Option<Message> {
    match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
        Ok(Some(Ok(msg))) => Some(msg),
        Ok(_) => None,
        Err(_) => panic!("timed out waiting for a relay message"),
    }
}

/// Third connection on a token is closed with a policy-violation frame and
/// never disturbs the first two.
#[tokio::test]
async fn test_third_connection_is_rejected() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut a = client(&relay, "full-room").await?;
    let mut b = client(&relay, "full-room").await?;
    relay.wait_for_participants(2).await?;

    let mut c = client(&relay, "full-room").await?;
    match next_message(&mut c).await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(frame.reason.as_str(), "room full");
        }
        other => panic!("expected a room-full close, got {other:?}"),
    }
    assert_eq!(relay.registry.participant_count(), 2);

    a.send(Message::Binary(Bytes::from_static(b"still paired"))).await?;
    assert_eq!(
        next_message(&mut b).await,
        Some(Message::Binary(Bytes::from_static(b"still paired")))
    );

    relay.stop().await;
    Ok(())
}

/// Binary frames reach the peer verbatim and in order; the sender never
/// sees its own frames and text frames are dropped.
#[tokio::test]
async fn test_frames_are_forwarded_blindly() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut a = client(&relay, "blind").await?;
    let mut b = client(&relay, "blind").await?;
    relay.wait_for_participants(2).await?;

    a.send(Message::Text("ignored".into())).await?;
    for i in 0u8..20 {
        a.send(Message::Binary(Bytes::from(vec![i; 1 + i as usize]))).await?;
    }
    for i in 0u8..20 {
        assert_eq!(
            next_message(&mut b).await,
            Some(Message::Binary(Bytes::from(vec![i; 1 + i as usize])))
        );
    }

    b.send(Message::Binary(Bytes::from_static(b"reply"))).await?;
    assert_eq!(
        next_message(&mut a).await,
        Some(Message::Binary(Bytes::from_static(b"reply")))
    );

    relay.stop().await;
    Ok(())
}

/// Rooms on different tokens are isolated.
#[tokio::test]
async fn test_tokens_are_isolated() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut a1 = client(&relay, "room-one").await?;
    let mut b1 = client(&relay, "room-one").await?;
    let mut a2 = client(&relay, "room-two").await?;
    let mut b2 = client(&relay, "room-two").await?;
    relay.wait_for_participants(4).await?;
    assert_eq!(relay.registry.room_count(), 2);

    a1.send(Message::Binary(Bytes::from_static(b"one"))).await?;
    a2.send(Message::Binary(Bytes::from_static(b"two"))).await?;
    assert_eq!(
        next_message(&mut b1).await,
        Some(Message::Binary(Bytes::from_static(b"one")))
    );
    assert_eq!(
        next_message(&mut b2).await,
        Some(Message::Binary(Bytes::from_static(b"two")))
    );

    relay.stop().await;
    Ok(())
}

/// The room is destroyed once both participants have gone.
#[tokio::test]
async fn test_room_is_destroyed_when_empty() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut a = client(&relay, "ephemeral").await?;
    let mut b = client(&relay, "ephemeral").await?;
    relay.wait_for_participants(2).await?;
    assert!(relay.registry.contains("ephemeral"));

    a.close(None).await?;
    relay.wait_for_participants(1).await?;
    assert!(relay.registry.contains("ephemeral"));

    b.close(None).await?;
    relay.wait_for_participants(0).await?;
    assert!(!relay.registry.contains("ephemeral"));
    assert_eq!(relay.registry.room_count(), 0);

    relay.stop().await;
    Ok(())
}

/// Shutting the relay down closes open sessions with a going-away frame.
#[tokio::test]
async fn test_shutdown_closes_sessions() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut a = client(&relay, "draining").await?;
    relay.wait_for_participants(1).await?;

    relay.stop().await;
    match next_message(&mut a).await {
        Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Away),
        Some(Message::Close(None)) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
    Ok(())
}

/// An engine endpoint joining a full room fails with `RoomFull`, without
/// retrying.
#[tokio::test]
async fn test_sender_sees_room_full() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);
    let _a = client(&relay, &session.token).await?;
    let _b = client(&relay, &session.token).await?;
    relay.wait_for_participants(2).await?;

    let mut sender = session.sender();
    let err = match sender.connect().await {
        Err(e) => e,
        Ok(()) => sender
            .wait_for_receiver(Duration::from_secs(5))
            .await
            .unwrap_err(),
    };
    assert!(matches!(err, TransferError::RoomFull), "got {err:?}");

    relay.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_health_and_stats() -> Result<()> {
    let relay = TestRelay::start().await?;

    let health: serde_json::Value = reqwest::get(format!("{}/health", relay.http_url()))
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");

    let _a = client(&relay, "counted").await?;
    let _b = client(&relay, "counted").await?;
    let _c = client(&relay, "other").await?;
    relay.wait_for_participants(3).await?;

    let stats: serde_json::Value = reqwest::get(format!("{}/stats", relay.http_url()))
        .await?
        .json()
        .await?;
    assert_eq!(stats["rooms"], 2);
    assert_eq!(stats["participants"], 3);

    relay.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_pages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("receiver.html"), "<h1>receive</h1>")?;
    std::fs::write(dir.path().join("sender.html"), "<h1>send</h1>")?;

    let relay = TestRelay::start_with(Some(dir.path().to_path_buf())).await?;
    let base = relay.http_url();

    let page = reqwest::get(format!("{base}/d/abc123")).await?;
    assert_eq!(page.status(), reqwest::StatusCode::OK);
    assert_eq!(page.text().await?, "<h1>receive</h1>");

    let page = reqwest::get(format!("{base}/u/abc123")).await?;
    assert_eq!(page.text().await?, "<h1>send</h1>");

    let bad = reqwest::get(format!("{base}/d/bad.token")).await?;
    assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);
    relay.stop().await;

    let bare = TestRelay::start().await?;
    let missing = reqwest::get(format!("{}/d/abc123", bare.http_url())).await?;
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    bare.stop().await;
    Ok(())
}
