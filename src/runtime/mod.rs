use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::audio::RodioOutput;
use crate::cache::AssetCache;
use crate::download::{Downloader, HttpTransport};
use crate::library::{Indexer, Library, LoftyExtractor, MetadataExtractor};
use crate::queue::QueueEngine;
use crate::store::{self, ConfigStore};

mod commands;
mod event_loop;
mod settings;
mod startup;

pub async fn run() -> anyhow::Result<()> {
    let cli = startup::parse_args(env::args().skip(1));
    let settings = settings::load_settings();

    let data_dir = settings.data_dir();
    let mut store = ConfigStore::open(data_dir.join(store::STORE_FILE));
    let roots = startup::library_roots(&cli, &settings.library, &mut store);

    let transport = HttpTransport::new(&settings.network).context("failed to build HTTP client")?;
    let downloader = Downloader::new(Arc::new(transport));
    let cache = AssetCache::new(settings.cache_dir(), downloader.clone());
    let extractor: Arc<dyn MetadataExtractor> = Arc::new(LoftyExtractor);
    let indexer = Indexer::new(settings.library.clone(), extractor.clone(), cache.clone(), &data_dir);

    let snapshot = if cli.rescan {
        indexer.rescan(&roots).await
    } else {
        indexer.load_or_rescan(&roots).await
    };
    let library = Library::new(snapshot);

    let volume = store.volume().unwrap_or(settings.playback.volume);
    let output = RodioOutput::open_default(volume).context("failed to open audio output")?;
    let mut engine = QueueEngine::new(output, store, &settings.playback);
    startup::restore_queue(&mut engine, &library.snapshot(), extractor.clone()).await;

    let mut session = event_loop::Session {
        engine,
        library,
        indexer,
        extractor,
        cache,
        downloader,
        roots,
        downloads: data_dir.join("downloads"),
    };
    event_loop::run(&mut session, Duration::from_millis(settings.playback.seek_sync_ms)).await
}
