use std::sync::Arc;

use tempfile::tempdir;

use super::*;
use crate::download::testing::{FakeTransport, Script};

fn cache_in(dir: &Path, transport: FakeTransport) -> (AssetCache, Arc<FakeTransport>) {
    let transport = Arc::new(transport);
    let cache = AssetCache::new(dir.join("cache"), Downloader::new(transport.clone()));
    (cache, transport)
}

#[test]
fn keys_are_hex_sha256() {
    let a = AssetCache::key_for_bytes(b"cover");
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(a, AssetCache::key_for_bytes(b"cover"));
    assert_ne!(a, AssetCache::key_for_bytes(b"other cover"));
    assert_eq!(
        AssetCache::key_for_url("https://example.com/a.jpg"),
        AssetCache::key_for_bytes(b"https://example.com/a.jpg")
    );
}

#[tokio::test]
async fn concurrent_byte_populations_issue_one_write() {
    let dir = tempdir().unwrap();
    let (cache, _) = cache_in(dir.path(), FakeTransport::default());

    let (a, b) = tokio::join!(
        cache.populate_bytes(b"jpeg bytes".to_vec()),
        cache.populate_bytes(b"jpeg bytes".to_vec())
    );
    let key = a.unwrap();
    assert_eq!(b.unwrap(), key);
    assert_eq!(cache.populations(), 1);
    assert_eq!(std::fs::read(cache.path_for(&key)).unwrap(), b"jpeg bytes");
}

#[tokio::test]
async fn populating_a_resident_key_does_not_rewrite_it() {
    let dir = tempdir().unwrap();
    let (cache, _) = cache_in(dir.path(), FakeTransport::default());

    let key = cache.populate_bytes(b"once".to_vec()).await.unwrap();
    assert!(cache.is_resident(&key));
    let again = cache.populate_bytes(b"once".to_vec()).await.unwrap();
    assert_eq!(again, key);
    assert_eq!(cache.populations(), 1);
}

#[tokio::test]
async fn resolve_without_population_is_not_cached() {
    let dir = tempdir().unwrap();
    let (cache, _) = cache_in(dir.path(), FakeTransport::default());

    let err = cache.resolve("deadbeef").await.unwrap_err();
    assert!(matches!(err, CacheError::NotCached(k) if k == "deadbeef"));
    assert_eq!(cache.populations(), 0);
}

#[tokio::test]
async fn resolve_waits_for_in_flight_url_population() {
    let dir = tempdir().unwrap();
    let (fake, gate) = FakeTransport::gated();
    fake.serve("https://cdn/art.png", Script::complete(b"png data"));
    let (cache, transport) = cache_in(dir.path(), fake);
    let key = AssetCache::key_for_url("https://cdn/art.png");

    let populate = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.populate_url("https://cdn/art.png").await })
    };
    tokio::task::yield_now().await;
    assert!(!cache.is_resident(&key));

    let resolve = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.resolve(&key).await })
    };
    tokio::task::yield_now().await;
    gate.add_permits(1);

    assert_eq!(populate.await.unwrap().unwrap(), key);
    let path = resolve.await.unwrap().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"png data");
    assert_eq!(transport.requests(), 1);
    assert_eq!(cache.populations(), 1);
}

#[tokio::test]
async fn failed_population_reaches_every_waiter() {
    let dir = tempdir().unwrap();
    let (fake, gate) = FakeTransport::gated();
    fake.serve(
        "https://cdn/broken.jpg",
        Script {
            content_length: Some(100),
            chunks: vec![vec![0u8; 80]],
            trailing_error: None,
        },
    );
    let (cache, transport) = cache_in(dir.path(), fake);
    let key = AssetCache::key_for_url("https://cdn/broken.jpg");

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.populate_url("https://cdn/broken.jpg").await })
    };
    let second = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.populate_url("https://cdn/broken.jpg").await })
    };
    tokio::task::yield_now().await;
    let waiting = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.resolve(&key).await })
    };
    tokio::task::yield_now().await;
    gate.add_permits(1);

    for outcome in [
        first.await.unwrap().map(|_| ()),
        second.await.unwrap().map(|_| ()),
        waiting.await.unwrap().map(|_| ()),
    ] {
        assert!(matches!(
            outcome,
            Err(CacheError::Download(DownloadError::Incomplete {
                received: 80,
                expected: 100
            }))
        ));
    }
    assert_eq!(transport.requests(), 1);
    assert!(!cache.is_resident(&key));

    // The key is no longer in flight, so resolve reports a plain miss.
    assert!(matches!(
        cache.resolve(&key).await,
        Err(CacheError::NotCached(_))
    ));
}
