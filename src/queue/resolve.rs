use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::library::{LibrarySnapshot, MetadataExtractor, RawMetadata, normalize_artists};

use super::model::QueueTrack;

const RESOLVE_CONCURRENCY: usize = 8;

fn from_metadata(key: &str, meta: RawMetadata) -> QueueTrack {
    let bare = QueueTrack::bare(key);
    QueueTrack {
        title: meta.title.unwrap_or(bare.title),
        artists: normalize_artists(&meta.artists),
        duration: meta.duration,
        ..bare
    }
}

/// Snapshot display data for `keys`, in order.
///
/// Keys known to the library are copied from it; anything else is read with
/// `extractor`, and a key that cannot be read gets a bare entry.
pub async fn resolve_queue_tracks(
    keys: &[String],
    snapshot: &LibrarySnapshot,
    extractor: Arc<dyn MetadataExtractor>,
) -> Vec<QueueTrack> {
    stream::iter(keys.iter().cloned())
        .map(|key| {
            let known = snapshot.track(&key).map(QueueTrack::from);
            let extractor = extractor.clone();
            async move {
                if let Some(track) = known {
                    return track;
                }
                let path = PathBuf::from(&key);
                match tokio::task::spawn_blocking(move || extractor.extract(&path)).await {
                    Ok(Ok(meta)) => from_metadata(&key, meta),
                    Ok(Err(e)) => {
                        log::warn!("{e}");
                        QueueTrack::bare(&key)
                    }
                    Err(e) => {
                        log::warn!("metadata task for {key} failed: {e}");
                        QueueTrack::bare(&key)
                    }
                }
            }
        })
        .buffered(RESOLVE_CONCURRENCY)
        .collect()
        .await
}
