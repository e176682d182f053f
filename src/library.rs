//! Local media library: scanning, indexing, persistence.

mod artists;
mod display;
mod extract;
mod model;
mod persist;
mod scan;


use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub use artists::{UNKNOWN_ARTIST, normalize_artists};
pub use display::format_duration;
pub use extract::{ExtractError, LoftyExtractor, MetadataExtractor, RawMetadata};
pub use model::{Album, Artist, LibrarySnapshot, Track};
pub use persist::{LibraryError, STORAGE_FILE, is_stale, load_snapshot, now_ms, save_snapshot};
pub use scan::{ScannedFile, build_index};

use crate::cache::AssetCache;
use crate::config::LibrarySettings;

/// Holds the current snapshot. Readers get their own `Arc` and keep an old
/// generation alive across a `replace`.
#[derive(Default)]
pub struct Library {
    current: RwLock<Arc<LibrarySnapshot>>,
}

impl Library {
    pub fn new(snapshot: LibrarySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<LibrarySnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, snapshot: LibrarySnapshot) {
        let snapshot = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

/// Builds snapshots from the filesystem and keeps them on disk.
pub struct Indexer {
    settings: LibrarySettings,
    extractor: Arc<dyn MetadataExtractor>,
    cache: AssetCache,
    data_dir: PathBuf,
}

impl Indexer {
    pub fn new(
        settings: LibrarySettings,
        extractor: Arc<dyn MetadataExtractor>,
        cache: AssetCache,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            extractor,
            cache,
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn stale_window(&self) -> Duration {
        Duration::from_secs(self.settings.stale_after_hours.saturating_mul(60 * 60))
    }

    /// Full rebuild of the index from `dirs`. The new snapshot is persisted
    /// before it is returned; a failed persist is logged and not fatal.
    pub async fn rescan(&self, dirs: &[PathBuf]) -> LibrarySnapshot {
        log::info!("rescanning library ({} roots)", dirs.len());
        let scanned = scan::scan(dirs, &self.settings, self.extractor.clone(), &self.cache).await;
        let snapshot = build_index(scanned, now_ms());
        log::info!(
            "indexed {} tracks, {} albums, {} artists",
            snapshot.tracks().len(),
            snapshot.albums().len(),
            snapshot.artists().len()
        );

        let dir = self.data_dir.clone();
        let to_save = snapshot.clone();
        match tokio::task::spawn_blocking(move || save_snapshot(&dir, &to_save)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("could not persist library: {e}"),
            Err(e) => log::warn!("library persist task failed: {e}"),
        }
        snapshot
    }

    /// The persisted snapshot when it exists and is fresh, otherwise a rescan.
    pub async fn load_or_rescan(&self, dirs: &[PathBuf]) -> LibrarySnapshot {
        let dir = self.data_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || load_snapshot(&dir)).await;
        match loaded {
            Ok(Ok(snapshot)) if !is_stale(snapshot.date(), now_ms(), self.stale_window()) => {
                log::info!("loaded library from disk ({} tracks)", snapshot.tracks().len());
                return snapshot;
            }
            Ok(Ok(_)) => log::info!("persisted library is stale"),
            Ok(Err(LibraryError::Io { source, .. })) if source.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no persisted library");
            }
            Ok(Err(e)) => log::warn!("ignoring persisted library: {e}"),
            Err(e) => log::warn!("library load task failed: {e}"),
        }
        self.rescan(dirs).await
    }
}
