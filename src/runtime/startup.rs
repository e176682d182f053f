use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::PlaybackOutput;
use crate::config::LibrarySettings;
use crate::library::{LibrarySnapshot, MetadataExtractor};
use crate::queue::{QueueEngine, resolve_queue_tracks};
use crate::store::ConfigStore;

/// Command-line arguments: `cadenza [--rescan] [DIR...]`.
#[derive(Debug, Default, PartialEq)]
pub struct Cli {
    pub rescan: bool,
    pub dirs: Vec<PathBuf>,
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Cli {
    let mut cli = Cli::default();
    for arg in args {
        match arg.as_str() {
            "--rescan" => cli.rescan = true,
            _ => cli.dirs.push(PathBuf::from(arg)),
        }
    }
    cli
}

/// Library roots in priority order: command line (which is remembered),
/// then the config file, then whatever was remembered last time.
pub fn library_roots(cli: &Cli, settings: &LibrarySettings, store: &mut ConfigStore) -> Vec<PathBuf> {
    if !cli.dirs.is_empty() {
        let dirs: Vec<PathBuf> = cli
            .dirs
            .iter()
            .map(|d| std::path::absolute(d).unwrap_or_else(|_| d.clone()))
            .collect();
        if let Err(e) = store.set_audio_directories(&dirs).and_then(|()| store.save()) {
            log::warn!("could not remember library directories: {e}");
        }
        return dirs;
    }
    if !settings.directories.is_empty() {
        return settings.directories.clone();
    }
    let remembered = store.audio_directories();
    if remembered.is_empty() {
        log::warn!("no library directories configured; pass one on the command line");
    }
    remembered
}

/// Bring back the queue saved by the previous run, paused.
pub async fn restore_queue<O: PlaybackOutput>(
    engine: &mut QueueEngine<O>,
    snapshot: &LibrarySnapshot,
    extractor: Arc<dyn MetadataExtractor>,
) {
    let record = engine.store().queue();
    if record.tracks.is_empty() {
        return;
    }
    let tracks = resolve_queue_tracks(&record.tracks, snapshot, extractor).await;
    engine.restore(tracks, &record);
}
