use std::path::{Path, PathBuf};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey};
use thiserror::Error;

/// Tag data as read from one file, before any normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    pub title: Option<String>,
    /// Raw artist values; each may hold several names.
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    /// Seconds.
    pub duration: Option<f64>,
    /// Bytes of the first embedded picture.
    pub picture: Option<Vec<u8>>,
}

#[derive(Debug, Error)]
#[error("failed to read metadata from {path}: {message}")]
pub struct ExtractError {
    pub path: PathBuf,
    pub message: String,
}

/// Reads tags and duration from an audio file. Implementations are blocking.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractError>;
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Tag reader backed by `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyExtractor;

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractError> {
        let tagged = lofty::read_from_path(path).map_err(|e| ExtractError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let duration = tagged.properties().duration();
        let mut meta = RawMetadata {
            duration: (!duration.is_zero()).then(|| duration.as_secs_f64()),
            ..RawMetadata::default()
        };

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            meta.title = tag.title().and_then(|v| non_empty(&v));
            meta.artists = tag.artist().and_then(|v| non_empty(&v)).into_iter().collect();
            meta.album = tag.album().and_then(|v| non_empty(&v));
            meta.album_artists = tag
                .items()
                .filter(|item| matches!(item.key(), ItemKey::AlbumArtist))
                .filter_map(|item| item.value().text().and_then(non_empty))
                .collect();
            meta.picture = tag.pictures().first().map(|p| p.data().to_vec());
        }

        Ok(meta)
    }
}
