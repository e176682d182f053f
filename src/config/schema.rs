use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level application settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/cadenza/config.toml` or `~/.config/cadenza/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `CADENZA__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub playback: PlaybackSettings,
    pub storage: StorageSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Root directories to index. When empty, the directories persisted in
    /// `config.json` (`audioDirectories`) are used instead.
    pub directories: Vec<PathBuf>,
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Age after which a persisted index is rebuilt instead of loaded.
    pub stale_after_hours: u64,
    /// Number of metadata extractions kept in flight during a rescan.
    pub extract_concurrency: usize,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            extensions: ["mp3", "mpeg", "opus", "ogg", "wav", "aac", "m4a", "flac"]
                .into_iter()
                .map(String::from)
                .collect(),
            follow_links: true,
            stale_after_hours: 48,
            extract_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Shuffle mode used when nothing was persisted yet.
    pub shuffle: ShuffleMode,
    /// Repeat mode used when nothing was persisted yet.
    pub repeat: RepeatMode,
    /// Seconds jumped back by `rewind`.
    pub rewind_seconds: f64,
    /// Seconds jumped forward by `skip`.
    pub skip_seconds: f64,
    /// Cadence of the seek synchronization tick (milliseconds).
    pub seek_sync_ms: u64,
    /// Initial output volume in `[0, 1]`.
    pub volume: f32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            shuffle: ShuffleMode::Normal,
            repeat: RepeatMode::Looping,
            rewind_seconds: 10.0,
            skip_seconds: 30.0,
            seek_sync_ms: 250,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding `storage.json`, `storageInfo.json` and `config.json`.
    pub data_dir: Option<PathBuf>,
    /// Directory of the content-addressed asset cache (defaults to `<data_dir>/cache`).
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Whole-request timeout for downloads. Unset means wait indefinitely.
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: format!("cadenza/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Presentation order of the queue.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShuffleMode {
    #[default]
    #[serde(alias = "off", alias = "ordered")]
    Normal,
    #[serde(alias = "shuffle", alias = "on")]
    Shuffled,
}

/// What happens when the current track ends.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatMode {
    /// Play through the queue once, then stop on the first track.
    #[serde(alias = "no_loop", alias = "no-loop", alias = "off")]
    Once,
    /// Repeat the current track forever.
    #[serde(
        alias = "repeat-one",
        alias = "repeat_one",
        alias = "loop-one",
        alias = "loop_one"
    )]
    Repeating,
    /// Wrap around to the start of the queue.
    #[default]
    #[serde(
        alias = "loop-all",
        alias = "loop_all",
        alias = "loopall",
        alias = "loop-around"
    )]
    Looping,
}
