use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Source path (or URL); the track's identity.
    pub key: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Seconds; `None` when unknown.
    pub duration: Option<f64>,
    /// Asset-cache key of the cover art.
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub title: String,
    pub artists: Vec<String>,
    pub tracks: Vec<String>,
    /// Sum of the known durations of `tracks`.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
    pub tracks: Vec<String>,
    pub albums: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Artist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
            albums: Vec::new(),
            summary: None,
        }
    }
}

/// One immutable generation of the library index.
///
/// Entries are held in presentation order: tracks by case-insensitive title,
/// albums and artists by case-insensitive key. Lookups by key go through
/// side maps, so ordering never affects identity.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    date: u64,
    tracks: Vec<Track>,
    albums: Vec<Album>,
    artists: Vec<Artist>,
    track_lookup: HashMap<String, usize>,
    album_lookup: HashMap<String, usize>,
    artist_lookup: HashMap<String, usize>,
}

fn case_insensitive(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

impl LibrarySnapshot {
    /// Build a snapshot taken at `date` (epoch milliseconds), sorting every
    /// collection into presentation order.
    pub fn new(date: u64, mut tracks: Vec<Track>, mut albums: Vec<Album>, mut artists: Vec<Artist>) -> Self {
        tracks.sort_by(|a, b| case_insensitive(&a.title, &b.title).then_with(|| a.key.cmp(&b.key)));
        albums.sort_by(|a, b| case_insensitive(&a.title, &b.title));
        artists.sort_by(|a, b| case_insensitive(&a.name, &b.name));

        for album in &mut albums {
            album.tracks.sort();
            album.tracks.dedup();
        }
        for artist in &mut artists {
            artist.tracks.sort();
            artist.tracks.dedup();
            artist.albums.sort();
            artist.albums.dedup();
        }

        let track_lookup = tracks.iter().enumerate().map(|(i, t)| (t.key.clone(), i)).collect();
        let album_lookup = albums.iter().enumerate().map(|(i, a)| (a.title.clone(), i)).collect();
        let artist_lookup = artists.iter().enumerate().map(|(i, a)| (a.name.clone(), i)).collect();

        Self {
            date,
            tracks,
            albums,
            artists,
            track_lookup,
            album_lookup,
            artist_lookup,
        }
    }

    /// When this generation was produced (epoch milliseconds).
    pub fn date(&self) -> u64 {
        self.date
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn albums(&self) -> &[Album] {
        &self.albums
    }

    pub fn artists(&self) -> &[Artist] {
        &self.artists
    }

    pub fn track(&self, key: &str) -> Option<&Track> {
        self.track_lookup.get(key).and_then(|&i| self.tracks.get(i))
    }

    pub fn album(&self, title: &str) -> Option<&Album> {
        self.album_lookup.get(title).and_then(|&i| self.albums.get(i))
    }

    pub fn artist(&self, name: &str) -> Option<&Artist> {
        self.artist_lookup.get(name).and_then(|&i| self.artists.get(i))
    }
}
