use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::cache::AssetCache;
use crate::config::LibrarySettings;
use crate::walker;

use super::artists::normalize_artists;
use super::extract::{MetadataExtractor, RawMetadata};
use super::model::{Album, Artist, LibrarySnapshot, Track};

/// One audio file after extraction and cover population.
#[derive(Debug, Clone, Default)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub meta: RawMetadata,
    pub picture: Option<String>,
}

pub(super) fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    let exts: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string()
}

/// Walk `dirs`, extract every audio file and cache its cover art.
///
/// Overlapping roots yield each file once. Extractions run
/// `extract_concurrency` at a time and may complete in any order; the
/// returned list is sorted by path once all of them finished.
pub async fn scan(
    dirs: &[PathBuf],
    settings: &LibrarySettings,
    extractor: Arc<dyn MetadataExtractor>,
    cache: &AssetCache,
) -> Vec<ScannedFile> {
    let files: BTreeSet<PathBuf> = walker::walk(dirs, settings.follow_links)
        .await
        .into_iter()
        .filter(|p| is_audio_file(p, &settings.extensions))
        .collect();
    log::debug!("found {} audio files under {} roots", files.len(), dirs.len());

    let mut scanned: Vec<ScannedFile> = stream::iter(files)
        .map(|path| scan_file(path, extractor.clone(), cache))
        .buffer_unordered(settings.extract_concurrency.max(1))
        .collect()
        .await;

    scanned.sort_by(|a, b| a.path.cmp(&b.path));
    scanned
}

async fn scan_file(
    path: PathBuf,
    extractor: Arc<dyn MetadataExtractor>,
    cache: &AssetCache,
) -> ScannedFile {
    let blocking_path = path.clone();
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&blocking_path)).await;

    let mut meta = match extracted {
        Ok(Ok(meta)) => meta,
        Ok(Err(e)) => {
            log::warn!("{e}; indexing with defaults");
            RawMetadata::default()
        }
        Err(e) => {
            log::warn!("metadata task for {} failed: {e}", path.display());
            RawMetadata::default()
        }
    };

    let picture = match meta.picture.take() {
        Some(bytes) => match cache.populate_bytes(bytes).await {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("could not cache cover of {}: {e}", path.display());
                None
            }
        },
        None => None,
    };

    ScannedFile {
        path,
        meta,
        picture,
    }
}

/// Cross-reference scanned files into a snapshot dated `date` (epoch ms).
pub fn build_index(scanned: Vec<ScannedFile>, date: u64) -> LibrarySnapshot {
    let mut tracks: Vec<Track> = Vec::with_capacity(scanned.len());
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(scanned.len());
    let mut albums: HashMap<String, Album> = HashMap::new();
    let mut album_order: Vec<String> = Vec::new();

    for file in scanned {
        if !seen.insert(file.path.clone()) {
            log::debug!("skipping duplicate {}", file.path.display());
            continue;
        }
        let key = file.path.to_string_lossy().to_string();
        let title = file.meta.title.clone().unwrap_or_else(|| file_stem(&file.path));
        let artists = normalize_artists(&file.meta.artists);
        let album_title = file
            .meta
            .album
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        if let Some(album_title) = &album_title {
            // Without an explicit album artist the track artists stand in.
            let album_artists = if file.meta.album_artists.is_empty() {
                normalize_artists(&file.meta.artists)
            } else {
                normalize_artists(&file.meta.album_artists)
            };

            let album = albums.entry(album_title.clone()).or_insert_with(|| {
                album_order.push(album_title.clone());
                Album {
                    title: album_title.clone(),
                    artists: Vec::new(),
                    tracks: Vec::new(),
                    duration: 0.0,
                }
            });
            for name in album_artists {
                if !album.artists.contains(&name) {
                    album.artists.push(name);
                }
            }
            album.tracks.push(key.clone());
            album.duration += file.meta.duration.unwrap_or(0.0);
        }

        tracks.push(Track {
            key,
            title,
            artists,
            album: album_title,
            duration: file.meta.duration,
            picture: file.picture,
        });
    }

    let mut artists: HashMap<String, Artist> = HashMap::new();
    for track in &tracks {
        for name in &track.artists {
            let artist = artists
                .entry(name.clone())
                .or_insert_with(|| Artist::new(name.clone()));
            match track.album.as_ref().and_then(|a| albums.get(a)) {
                Some(album) if album.artists.contains(name) => artist.albums.push(album.title.clone()),
                _ => artist.tracks.push(track.key.clone()),
            }
        }
    }
    for title in &album_order {
        if let Some(album) = albums.get(title) {
            for name in &album.artists {
                artists
                    .entry(name.clone())
                    .or_insert_with(|| Artist::new(name.clone()))
                    .albums
                    .push(album.title.clone());
            }
        }
    }

    LibrarySnapshot::new(
        date,
        tracks,
        albums.into_values().collect(),
        artists.into_values().collect(),
    )
}
