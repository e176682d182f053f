use serde::{Deserialize, Serialize};

use crate::config::{RepeatMode, ShuffleMode};
use crate::library::{Track, UNKNOWN_ARTIST};

/// Display data copied out of the library when a track is enqueued.
///
/// Later rescans never touch an item that is already queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTrack {
    pub key: String,
    pub title: String,
    pub artists: Vec<String>,
    pub picture: Option<String>,
    pub duration: Option<f64>,
}

impl QueueTrack {
    /// A snapshot with nothing but the key, titled after the file stem.
    pub fn bare(key: &str) -> Self {
        let title = std::path::Path::new(key)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(key)
            .to_string();
        Self {
            key: key.to_string(),
            title,
            artists: vec![UNKNOWN_ARTIST.to_string()],
            picture: None,
            duration: None,
        }
    }

    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

impl From<&Track> for QueueTrack {
    fn from(track: &Track) -> Self {
        Self {
            key: track.key.clone(),
            title: track.title.clone(),
            artists: track.artists.clone(),
            picture: track.picture.clone(),
            duration: track.duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Insertion counter. Never reused or renumbered while the queue lives.
    pub index: u64,
    /// Rank in the unshuffled queue. Inserting after an item shifts the
    /// ranks behind it.
    pub order: u64,
    pub track: QueueTrack,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PlayingMode {
    #[default]
    Paused,
    Playing,
}

/// State changes published to observers (display, remote control).
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    TrackChanged { position: usize, track: QueueTrack },
    QueueChanged { len: usize },
    PlayingModeChanged(PlayingMode),
    ShuffleModeChanged(ShuffleMode),
    RepeatModeChanged(RepeatMode),
    /// `fraction` is `elapsed / duration`, or 0 when the duration is unknown.
    Seek { elapsed: f64, fraction: f64 },
    Cleared,
}
