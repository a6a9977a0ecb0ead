use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use pulse_core::crypto::checksum;
use pulse_core::wire::MAX_PAYLOAD;
use pulse_transfer::config::MAX_CHUNK_SIZE;
use pulse_transfer::{HistoryEntry, ReceiverState, SenderState, TransferDirection};

use crate::*;

/// A 150 000-byte file crosses a real relay in three chunks and arrives
/// byte-identical.
#[tokio::test]
async fn test_single_file_end_to_end() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let content = pattern(150_000);
    let path = write_file(src.path(), "photo.jpg", &content);

    let (mut sender, mut receiver) = pair(&relay, &session).await?;
    let cancel = CancellationToken::new();
    let mut sent_progress = Vec::new();
    let mut recv_progress = Vec::new();

    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender
                .send_file(&path, &cancel, |done, total| sent_progress.push((done, total)))
                .await
        },
        receiver.receive_file(dst.path(), &cancel, |done, total| {
            recv_progress.push((done, total))
        }),
    );
    let sent = sent?;
    let (saved, received) = received?;

    assert_eq!(saved, dst.path().join("photo.jpg"));
    let written = std::fs::read(&saved)?;
    assert_eq!(checksum(&written), checksum(&content));
    assert_eq!(written, content);

    assert_eq!(sent.bytes_transferred, 150_000);
    assert_eq!(received.bytes_transferred, 150_000);
    assert_eq!(
        sent_progress,
        vec![(65_536, 150_000), (131_072, 150_000), (150_000, 150_000)]
    );
    assert_eq!(recv_progress, sent_progress);
    assert_eq!(sender.state(), SenderState::Done);
    assert_eq!(receiver.state(), ReceiverState::Done);
    assert_eq!(dir_entries(dst.path()), vec!["photo.jpg"]);

    sender.close().await;
    receiver.close().await;
    relay.wait_for_participants(0).await?;
    relay.stop().await;
    Ok(())
}

/// The largest accepted chunk size still fits one relay frame once sealed.
#[tokio::test]
async fn test_largest_chunk_size_crosses_relay() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut session = TestSession::new(&relay);
    session.config.chunk_size = MAX_PAYLOAD;
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let content = pattern(MAX_CHUNK_SIZE + 10);
    let path = write_file(src.path(), "disk.img", &content);

    let (mut sender, mut receiver) = pair(&relay, &session).await?;
    let cancel = CancellationToken::new();
    let mut sent_progress = Vec::new();

    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender
                .send_file(&path, &cancel, |done, _| sent_progress.push(done))
                .await
        },
        receiver.receive_file(dst.path(), &cancel, |_, _| {}),
    );
    sent?;
    let (saved, _) = received?;

    assert_eq!(sent_progress, vec![MAX_CHUNK_SIZE as u64, content.len() as u64]);
    assert_eq!(std::fs::read(&saved)?, content);

    relay.stop().await;
    Ok(())
}

/// Small chunks and an empty file both work over the wire.
#[tokio::test]
async fn test_small_chunks_and_empty_file() -> Result<()> {
    let relay = TestRelay::start().await?;
    let mut session = TestSession::new(&relay);
    session.config.chunk_size = 1024;
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let content = pattern(10_000);
    let paths = vec![
        write_file(src.path(), "notes.txt", &content),
        write_file(src.path(), "empty.bin", b""),
    ];

    let (mut sender, mut receiver) = pair(&relay, &session).await?;
    let cancel = CancellationToken::new();
    let mut chunks = 0usize;
    let mut sent_history: Vec<HistoryEntry> = Vec::new();
    let mut recv_history: Vec<HistoryEntry> = Vec::new();

    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender
                .send_batch(&paths, &cancel, &mut sent_history, |_| chunks += 1)
                .await
        },
        receiver.receive_batch(dst.path(), &cancel, &mut recv_history, |_| {}),
    );
    let sent = sent?;
    let received = received?;

    assert_eq!(chunks, 10);
    assert_eq!(sent.len(), 2);
    assert_eq!(received.len(), 2);
    assert_eq!(std::fs::read(dst.path().join("notes.txt"))?, content);
    assert_eq!(std::fs::read(dst.path().join("empty.bin"))?, b"");
    assert_eq!(received[1].1.bytes_transferred, 0);

    relay.stop().await;
    Ok(())
}

/// A batch over one connection: every file lands, each side records one
/// history entry per file, in order.
#[tokio::test]
async fn test_batch_transfer_records_history() -> Result<()> {
    let relay = TestRelay::start().await?;
    let session = TestSession::new(&relay);
    let src = tempfile::tempdir()?;
    let dst = tempfile::tempdir()?;
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("a.txt", pattern(100)),
        ("b.bin", pattern(70_000)),
        ("c.pdf", pattern(200_000)),
    ];
    let paths: Vec<_> = files
        .iter()
        .map(|(name, content)| write_file(src.path(), name, content))
        .collect();

    let (mut sender, mut receiver) = pair(&relay, &session).await?;
    let cancel = CancellationToken::new();
    let mut sent_history: Vec<HistoryEntry> = Vec::new();
    let mut recv_history: Vec<HistoryEntry> = Vec::new();
    let mut seen_batches = Vec::new();

    let (sent, received) = tokio::join!(
        async {
            sender.wait_for_receiver(Duration::from_secs(5)).await?;
            sender
                .send_batch(&paths, &cancel, &mut sent_history, |_| {})
                .await
        },
        receiver.receive_batch(dst.path(), &cancel, &mut recv_history, |p| {
            seen_batches.push((p.index, p.batch_total))
        }),
    );
    sent?;
    let received = received?;

    assert_eq!(dir_entries(dst.path()), vec!["a.txt", "b.bin", "c.pdf"]);
    for (name, content) in &files {
        assert_eq!(&std::fs::read(dst.path().join(name))?, content);
    }
    assert_eq!(received.len(), 3);
    assert!(seen_batches.iter().all(|&(_, total)| total == 3));
    assert_eq!(seen_batches.last().map(|&(i, _)| i), Some(2));

    let names = |h: &[HistoryEntry]| h.iter().map(|e| e.filename.clone()).collect::<Vec<_>>();
    assert_eq!(names(&sent_history), vec!["a.txt", "b.bin", "c.pdf"]);
    assert_eq!(names(&recv_history), vec!["a.txt", "b.bin", "c.pdf"]);
    assert!(sent_history
        .iter()
        .all(|e| e.direction == TransferDirection::Send && e.status == "ok"));
    assert!(recv_history
        .iter()
        .all(|e| e.direction == TransferDirection::Receive && e.status == "ok"));
    assert_eq!(recv_history[2].checksum, checksum(&files[2].1));

    relay.stop().await;
    Ok(())
}
