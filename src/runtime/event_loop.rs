use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

use crate::audio::PlaybackOutput;
use crate::cache::AssetCache;
use crate::config::{RepeatMode, ShuffleMode};
use crate::download::{DownloadEvent, Downloader};
use crate::library::{Indexer, Library, LibrarySnapshot, MetadataExtractor, format_duration};
use crate::queue::{PlayingMode, QueueEngine, QueueEvent, resolve_queue_tracks};

use super::commands::{self, Command, HELP};

/// Everything the command loop drives.
pub struct Session<O: PlaybackOutput> {
    pub engine: QueueEngine<O>,
    pub library: Library,
    pub indexer: Indexer,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub cache: AssetCache,
    pub downloader: Downloader,
    pub roots: Vec<PathBuf>,
    /// Where `fetch` stores episodes.
    pub downloads: PathBuf,
}

/// Keys an `add` argument stands for: an album's tracks, an artist's tracks
/// and albums, or the argument itself as a track key.
fn keys_for(snapshot: &LibrarySnapshot, what: &str) -> Vec<String> {
    if let Some(album) = snapshot.album(what) {
        return album.tracks.clone();
    }
    if let Some(artist) = snapshot.artist(what) {
        let mut keys = artist.tracks.clone();
        for title in &artist.albums {
            if let Some(album) = snapshot.album(title) {
                keys.extend(album.tracks.iter().cloned());
            }
        }
        return keys;
    }
    vec![what.to_string()]
}

/// File name for a fetched URL: its last path segment, else the URL's hash.
/// `None` for anything but http(s).
fn download_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let name = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(String::from)
        .unwrap_or_else(|| AssetCache::key_for_url(url));
    Some(name)
}

fn percent(received: u64, total: Option<u64>) -> Option<u64> {
    total.filter(|t| *t > 0).map(|t| (received.min(t) * 100) / t)
}

fn next_repeat(mode: RepeatMode) -> RepeatMode {
    match mode {
        RepeatMode::Once => RepeatMode::Repeating,
        RepeatMode::Repeating => RepeatMode::Looping,
        RepeatMode::Looping => RepeatMode::Once,
    }
}

impl<O: PlaybackOutput> Session<O> {
    async fn add(&mut self, what: &str) {
        let snapshot = self.library.snapshot();
        let keys = keys_for(&snapshot, what);
        let ticket = self.engine.begin_enqueue();
        let tracks = resolve_queue_tracks(&keys, &snapshot, self.extractor.clone()).await;
        self.engine.finish_enqueue(ticket, tracks, false, None);
    }

    /// Download an episode, printing progress, and enqueue it once complete.
    /// Ctrl-C aborts the transfer.
    async fn fetch(&mut self, url: &str) {
        let Some(name) = download_name(url) else {
            println!("not an http(s) URL: {url}");
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.downloads).await {
            println!("cannot create {}: {e}", self.downloads.display());
            return;
        }

        let mut download = self.downloader.download(url, self.downloads.join(name));
        let mut shown: Option<u64> = None;
        loop {
            let event = tokio::select! {
                event = download.next_event() => event,
                _ = tokio::signal::ctrl_c() => {
                    download.abort();
                    println!("aborted download to {}", download.destination().display());
                    return;
                }
            };
            match event {
                Some(DownloadEvent::Progress { received, total }) => {
                    let Some(p) = percent(received, total) else {
                        continue;
                    };
                    if shown.is_none_or(|last| p >= last + 10) {
                        println!("{}: {p}%", download.destination().display());
                        shown = Some(p);
                    }
                }
                Some(DownloadEvent::Done(path)) => {
                    println!("saved {}", path.display());
                    self.add(&path.to_string_lossy()).await;
                    return;
                }
                Some(DownloadEvent::Failed(e)) => {
                    println!("download failed: {e}");
                    return;
                }
                None => {
                    println!("download aborted");
                    return;
                }
            }
        }
    }

    async fn cover(&self, url: Option<&str>) {
        let outcome = match url {
            Some(url) => self
                .cache
                .populate_url(url)
                .await
                .map(|key| self.cache.path_for(&key)),
            None => match self.engine.current().and_then(|item| item.track.picture.clone()) {
                Some(key) => self.cache.resolve(&key).await,
                None => {
                    println!("no cover art");
                    return;
                }
            },
        };
        match outcome {
            Ok(path) => println!("cover: {}", path.display()),
            Err(e) => println!("{e}"),
        }
    }

    fn list(&self) {
        if self.engine.is_empty() {
            println!("queue is empty");
            return;
        }
        for (pos, item) in self.engine.items().iter().enumerate() {
            let marker = if Some(pos) == self.engine.playing_index() { '>' } else { ' ' };
            let length = item.track.duration.map(format_duration).unwrap_or_else(|| "-:--".into());
            println!(
                "{marker}{:>3}. {} - {} [{length}]",
                pos + 1,
                item.track.artist_line(),
                item.track.title
            );
        }
    }

    fn status(&self) {
        let engine = &self.engine;
        let now = engine
            .current()
            .map(|item| format!("{} - {}", item.track.artist_line(), item.track.title))
            .unwrap_or_else(|| "nothing".into());
        let length = engine
            .current()
            .and_then(|item| item.track.duration)
            .map(format_duration)
            .unwrap_or_else(|| "-:--".into());
        let state = match engine.playing_mode() {
            PlayingMode::Playing => "playing",
            PlayingMode::Paused => "paused",
        };
        println!(
            "[{}] {state}: {now} {}/{length} ({:?}, {:?}, volume {:.2})",
            engine.position_label(),
            format_duration(engine.seek_time()),
            engine.shuffle_mode(),
            engine.repeat_mode(),
            engine.volume()
        );
    }

    async fn rescan(&mut self) {
        let snapshot = self.indexer.rescan(&self.roots).await;
        println!(
            "library: {} tracks, {} albums, {} artists",
            snapshot.tracks().len(),
            snapshot.albums().len(),
            snapshot.artists().len()
        );
        self.library.replace(snapshot);
    }

    /// Apply one command. Returns false when the loop should stop.
    pub async fn apply(&mut self, cmd: Command) -> bool {
        let engine = &mut self.engine;
        match cmd {
            Command::Play => engine.play(),
            Command::Pause => engine.pause(),
            Command::Toggle => engine.toggle_play(),
            Command::Next => engine.next(),
            Command::Prev => engine.previous(),
            Command::Shuffle(mode) => {
                let mode = mode.unwrap_or(match engine.shuffle_mode() {
                    ShuffleMode::Normal => ShuffleMode::Shuffled,
                    ShuffleMode::Shuffled => ShuffleMode::Normal,
                });
                engine.set_shuffle_mode(mode);
            }
            Command::Repeat(mode) => {
                let mode = mode.unwrap_or_else(|| next_repeat(engine.repeat_mode()));
                engine.set_repeat_mode(mode);
            }
            Command::Add(what) => self.add(&what).await,
            Command::Fetch(url) => self.fetch(&url).await,
            Command::Cover(url) => self.cover(url.as_deref()).await,
            Command::Clear => engine.clear(),
            Command::Remove(pos) => {
                if engine.remove(pos).is_none() {
                    println!("no item at {}", pos + 1);
                }
            }
            Command::Select(pos) => {
                if !engine.select(pos) {
                    println!("no item at {}", pos + 1);
                }
            }
            Command::Seek(seconds) => engine.seek_to(seconds),
            Command::Rewind => engine.rewind(),
            Command::Skip => engine.skip(),
            Command::Volume(v) => engine.set_volume(v),
            Command::List => self.list(),
            Command::Status => self.status(),
            Command::Rescan => self.rescan().await,
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }
}

fn print_event(event: &QueueEvent) {
    match event {
        QueueEvent::TrackChanged { position, track } => {
            println!("now: {}. {} - {}", position + 1, track.artist_line(), track.title);
        }
        QueueEvent::QueueChanged { len } => println!("queue: {len} tracks"),
        QueueEvent::PlayingModeChanged(PlayingMode::Playing) => println!("playing"),
        QueueEvent::PlayingModeChanged(PlayingMode::Paused) => println!("paused"),
        QueueEvent::ShuffleModeChanged(mode) => println!("shuffle: {mode:?}"),
        QueueEvent::RepeatModeChanged(mode) => println!("repeat: {mode:?}"),
        QueueEvent::Cleared => println!("queue cleared"),
        // Position updates arrive every tick; `status` shows them on demand.
        QueueEvent::Seek { .. } => {}
    }
}

/// Read commands from stdin until `quit` or end of input. The same loop
/// samples the playback position every `seek_sync` and fires end-of-track.
pub async fn run<O: PlaybackOutput>(session: &mut Session<O>, seek_sync: Duration) -> anyhow::Result<()> {
    let mut events = session.engine.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(seek_sync);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    println!("{HELP}");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match commands::parse(&line) {
                    Ok(cmd) => {
                        if !session.apply(cmd).await {
                            break;
                        }
                    }
                    Err(msg) if msg.is_empty() => {}
                    Err(msg) => println!("{msg}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => {
                session.engine.check_ended();
                session.engine.sync_seek();
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => log::debug!("dropped {n} queue events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    session.engine.persist();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{Album, Artist, Track};

    fn track(key: &str, album: Option<&str>) -> Track {
        Track {
            key: key.into(),
            title: key.into(),
            artists: vec!["Band".into()],
            album: album.map(String::from),
            duration: None,
            picture: None,
        }
    }

    #[test]
    fn add_expands_albums_and_artists() {
        let album = Album {
            title: "Record".into(),
            artists: vec!["Band".into()],
            tracks: vec!["/m/1.mp3".into(), "/m/2.mp3".into()],
            duration: 0.0,
        };
        let mut band = Artist::new("Band");
        band.tracks.push("/m/single.mp3".into());
        band.albums.push("Record".into());
        let snapshot = LibrarySnapshot::new(
            0,
            vec![
                track("/m/1.mp3", Some("Record")),
                track("/m/2.mp3", Some("Record")),
                track("/m/single.mp3", None),
            ],
            vec![album],
            vec![band],
        );

        assert_eq!(keys_for(&snapshot, "Record"), ["/m/1.mp3", "/m/2.mp3"]);
        assert_eq!(keys_for(&snapshot, "Band"), ["/m/single.mp3", "/m/1.mp3", "/m/2.mp3"]);
        assert_eq!(keys_for(&snapshot, "https://x/ep.mp3"), ["https://x/ep.mp3"]);
    }

    #[test]
    fn download_names_come_from_the_url_path() {
        assert_eq!(download_name("https://x.org/feed/ep12.mp3?token=1").as_deref(), Some("ep12.mp3"));
        assert_eq!(
            download_name("http://x.org/").as_deref(),
            Some(AssetCache::key_for_url("http://x.org/").as_str())
        );
        assert_eq!(download_name("file:///etc/passwd"), None);
        assert_eq!(download_name("not a url"), None);
    }

    #[test]
    fn progress_is_a_bounded_percentage() {
        assert_eq!(percent(50, Some(200)), Some(25));
        assert_eq!(percent(300, Some(200)), Some(100));
        assert_eq!(percent(10, None), None);
        assert_eq!(percent(10, Some(0)), None);
    }

    #[test]
    fn repeat_cycles_through_all_modes() {
        let mut mode = RepeatMode::Once;
        for expected in [RepeatMode::Repeating, RepeatMode::Looping, RepeatMode::Once] {
            mode = next_repeat(mode);
            assert_eq!(mode, expected);
        }
    }
}
