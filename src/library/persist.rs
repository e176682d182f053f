//! On-disk form of a library snapshot.
//!
//! Two records live in the data directory: `storage.json` holds the index and
//! `storageInfo.json` holds `{ "date": <epoch ms> }`. The index is written
//! first so a present info record always describes a complete index.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{Album, Artist, LibrarySnapshot, Track};

pub const STORAGE_FILE: &str = "storage.json";
pub const STORAGE_INFO_FILE: &str = "storageInfo.json";

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed library record {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct StoredIndex {
    albums: Vec<Album>,
    tracks: Vec<Track>,
    artists: Vec<Artist>,
}

#[derive(Serialize, Deserialize)]
struct StorageInfo {
    date: u64,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// True once `window` has elapsed since `date_ms`.
pub fn is_stale(date_ms: u64, now_ms: u64, window: Duration) -> bool {
    now_ms >= date_ms.saturating_add(window.as_millis() as u64)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), LibraryError> {
    let json = serde_json::to_vec(value).map_err(|source| LibraryError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    let io_err = |source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LibraryError> {
    let raw = fs::read(path).map_err(|source| LibraryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| LibraryError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_snapshot(dir: &Path, snapshot: &LibrarySnapshot) -> Result<(), LibraryError> {
    fs::create_dir_all(dir).map_err(|source| LibraryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let index = StoredIndex {
        albums: snapshot.albums().to_vec(),
        tracks: snapshot.tracks().to_vec(),
        artists: snapshot.artists().to_vec(),
    };
    write_json(&dir.join(STORAGE_FILE), &index)?;
    write_json(
        &dir.join(STORAGE_INFO_FILE),
        &StorageInfo {
            date: snapshot.date(),
        },
    )
}

/// Date of the last persisted rescan, if any.
pub fn load_date(dir: &Path) -> Result<u64, LibraryError> {
    read_json::<StorageInfo>(&dir.join(STORAGE_INFO_FILE)).map(|info| info.date)
}

pub fn load_snapshot(dir: &Path) -> Result<LibrarySnapshot, LibraryError> {
    let date = load_date(dir)?;
    let index: StoredIndex = read_json(&dir.join(STORAGE_FILE))?;
    Ok(LibrarySnapshot::new(
        date,
        index.tracks,
        index.albums,
        index.artists,
    ))
}
