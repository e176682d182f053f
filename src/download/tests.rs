use std::sync::Arc;

use tempfile::tempdir;

use super::testing::{FakeTransport, Script};
use super::*;

fn downloader(transport: FakeTransport) -> (Downloader, Arc<FakeTransport>) {
    let transport = Arc::new(transport);
    (Downloader::new(transport.clone()), transport)
}

fn leftovers(dir: &Path, destination: &Path) -> Vec<PathBuf> {
    let prefix = destination.file_name().unwrap().to_string_lossy().to_string();
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            name.starts_with(&prefix) && name != prefix
        })
        .collect()
}

#[tokio::test]
async fn complete_download_is_renamed_into_place() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("episode.mp3");
    let payload = vec![7u8; 100];

    let fake = FakeTransport::default();
    fake.serve("http://host/ep", Script::complete(&payload));
    let (dl, _) = downloader(fake);

    let mut download = dl.download("http://host/ep", &dest);
    let mut last_progress = 0;
    let done = loop {
        match download.next_event().await {
            Some(DownloadEvent::Progress { received, total }) => {
                assert_eq!(total, Some(100));
                assert!(received > last_progress);
                last_progress = received;
            }
            Some(DownloadEvent::Done(path)) => break path,
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert_eq!(done, dest);
    assert_eq!(last_progress, 100);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
    assert!(leftovers(dir.path(), &dest).is_empty());
}

#[tokio::test]
async fn unknown_length_trusts_end_of_stream() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("cover");

    let fake = FakeTransport::default();
    fake.serve(
        "http://host/cover",
        Script {
            content_length: None,
            chunks: vec![b"abc".to_vec(), b"def".to_vec()],
            trailing_error: None,
        },
    );
    let (dl, _) = downloader(fake);

    let path = dl.download("http://host/cover", &dest).finish().await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"abcdef");
}

#[tokio::test]
async fn short_read_is_reported_and_not_renamed() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("short.mp3");

    let fake = FakeTransport::default();
    fake.serve(
        "http://host/short",
        Script {
            content_length: Some(100),
            chunks: vec![vec![1u8; 80]],
            trailing_error: None,
        },
    );
    let (dl, _) = downloader(fake);

    let err = dl.download("http://host/short", &dest).finish().await.unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Incomplete {
            received: 80,
            expected: 100
        }
    ));
    assert!(!dest.exists());
    // The partial temp file is intentionally left behind.
    assert_eq!(leftovers(dir.path(), &dest).len(), 1);
}

#[tokio::test]
async fn stream_error_before_declared_length_counts_as_incomplete() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("cut.mp3");

    let fake = FakeTransport::default();
    fake.serve(
        "http://host/cut",
        Script {
            content_length: Some(64),
            chunks: vec![vec![0u8; 32]],
            trailing_error: Some(DownloadError::Http("connection reset".into())),
        },
    );
    let (dl, _) = downloader(fake);

    let err = dl.download("http://host/cut", &dest).finish().await.unwrap_err();
    assert!(matches!(
        err,
        DownloadError::Incomplete {
            received: 32,
            expected: 64
        }
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn http_status_failure_propagates() {
    let dir = tempdir().unwrap();
    let (dl, _) = downloader(FakeTransport::default());

    let err = dl
        .download("http://host/missing", dir.path().join("x"))
        .finish()
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::Status(404)));
}

#[tokio::test]
async fn concurrent_requests_for_same_destination_share_one_transfer() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("shared.mp3");

    let (fake, gate) = FakeTransport::gated();
    fake.serve("http://host/shared", Script::complete(b"shared payload"));
    let (dl, transport) = downloader(fake);

    let first = dl.download("http://host/shared", &dest);
    let second = dl.download("http://host/shared", &dest);
    gate.add_permits(1);

    let (a, b) = tokio::join!(first.finish(), second.finish());
    assert_eq!(a.unwrap(), dest);
    assert_eq!(b.unwrap(), dest);
    assert_eq!(transport.requests(), 1);
}

#[tokio::test]
async fn abort_suppresses_every_later_notification() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("aborted.mp3");

    let (fake, gate) = FakeTransport::gated();
    fake.serve("http://host/slow", Script::complete(&[9u8; 48]));
    let (dl, _) = downloader(fake);

    let first = dl.download("http://host/slow", &dest);
    let mut joined = dl.download("http://host/slow", &dest);
    tokio::task::yield_now().await;

    first.abort();
    gate.add_permits(1);
    tokio::task::yield_now().await;

    assert!(joined.next_event().await.is_none());
    assert!(matches!(first.finish().await, Err(DownloadError::Aborted)));
    assert!(!dest.exists());
}

#[tokio::test]
async fn destination_is_free_again_after_abort() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("retry.mp3");

    let (fake, gate) = FakeTransport::gated();
    fake.serve("http://host/retry", Script::complete(b"second time lucky"));
    let (dl, transport) = downloader(fake);

    let first = dl.download("http://host/retry", &dest);
    tokio::task::yield_now().await;
    first.abort();
    let retry = dl.download("http://host/retry", &dest);
    gate.add_permits(2);

    assert_eq!(retry.finish().await.unwrap(), dest);
    assert_eq!(transport.requests(), 2);
}
