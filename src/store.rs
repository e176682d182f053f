//! Durable flat key-value store backed by `config.json`.
//!
//! Holds the mutable user state that survives restarts (library roots, the
//! serialized queue, playback modes). Static settings live in `config`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{RepeatMode, ShuffleMode};

/// File name of the store inside the data directory.
pub const STORE_FILE: &str = "config.json";

pub const AUDIO_DIRECTORIES: &str = "audioDirectories";
pub const QUEUE_TRACKS: &str = "queueTracks";
pub const PLAYING_INDEX: &str = "playingIndex";
pub const SEEK_TIME: &str = "seekTime";
pub const SHUFFLE_MODE: &str = "shuffleMode";
pub const REPEAT_MODE: &str = "repeatMode";
pub const CURRENT_VOLUME: &str = "currentVolume";
pub const REWIND_TIME: &str = "rewindTime";
pub const SKIP_TIME: &str = "skipTime";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize value for `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The persisted queue triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueRecord {
    pub tracks: Vec<String>,
    /// Index into `tracks`, -1 when nothing is selected.
    pub playing_index: i64,
    pub seek_time: f64,
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl ConfigStore {
    /// Open the store at `path`. A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("ignoring unparsable {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                log::warn!("failed to read {}: {e}", path.display());
                Map::new()
            }
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Typed lookup. A value of the wrong shape is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("ignoring malformed `{key}` in {}: {e}", self.path.display());
                None
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Write the store to disk through a temporary file renamed into place.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_vec_pretty(&self.values).map_err(|source| StoreError::Serialize {
            key: String::new(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    pub fn audio_directories(&self) -> Vec<PathBuf> {
        self.get(AUDIO_DIRECTORIES).unwrap_or_default()
    }

    pub fn set_audio_directories(&mut self, dirs: &[PathBuf]) -> Result<(), StoreError> {
        self.set(AUDIO_DIRECTORIES, dirs)
    }

    pub fn queue(&self) -> QueueRecord {
        QueueRecord {
            tracks: self.get(QUEUE_TRACKS).unwrap_or_default(),
            playing_index: self.get(PLAYING_INDEX).unwrap_or(-1),
            seek_time: self.get(SEEK_TIME).unwrap_or(0.0),
        }
    }

    pub fn set_queue(&mut self, record: &QueueRecord) -> Result<(), StoreError> {
        self.set(QUEUE_TRACKS, &record.tracks)?;
        self.set(PLAYING_INDEX, record.playing_index)?;
        self.set(SEEK_TIME, record.seek_time)
    }

    pub fn shuffle_mode(&self) -> Option<ShuffleMode> {
        self.get(SHUFFLE_MODE)
    }

    pub fn repeat_mode(&self) -> Option<RepeatMode> {
        self.get(REPEAT_MODE)
    }

    pub fn volume(&self) -> Option<f32> {
        self.get(CURRENT_VOLUME)
    }

    pub fn rewind_time(&self) -> Option<f64> {
        self.get(REWIND_TIME)
    }

    pub fn skip_time(&self) -> Option<f64> {
        self.get(SKIP_TIME)
    }
}
