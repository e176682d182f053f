use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::PlaybackOutput;
use crate::config::{PlaybackSettings, RepeatMode, ShuffleMode};
use crate::store::{self, ConfigStore, QueueRecord};

use super::model::{PlayingMode, QueueEvent, QueueItem, QueueTrack};

const EVENT_CAPACITY: usize = 256;

/// Proof that an enqueue was started against a given queue generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueTicket {
    generation: u64,
}

/// The queue state machine.
///
/// `items` is held in presentation order. `playing`, when set, is always a
/// valid position in `items`. Every transition is written to the store.
pub struct QueueEngine<O: PlaybackOutput> {
    output: O,
    store: ConfigStore,
    items: Vec<QueueItem>,
    playing: Option<usize>,
    mode: PlayingMode,
    shuffle: ShuffleMode,
    repeat: RepeatMode,
    seek_time: f64,
    next_index: u64,
    next_order: u64,
    generation: u64,
    rewind_time: f64,
    skip_time: f64,
    volume: f32,
    events: broadcast::Sender<QueueEvent>,
}

fn clamp_to_track(seconds: f64, duration: Option<f64>) -> f64 {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    match duration {
        Some(d) => seconds.min(d),
        None => seconds,
    }
}

fn seek_fraction(elapsed: f64, duration: Option<f64>) -> f64 {
    match duration {
        Some(d) if d > 0.0 => clamp_to_track(elapsed, Some(d)) / d,
        _ => 0.0,
    }
}

impl<O: PlaybackOutput> QueueEngine<O> {
    /// Modes, volume and step sizes come from the store, falling back to
    /// `defaults` for anything never persisted.
    pub fn new(mut output: O, store: ConfigStore, defaults: &PlaybackSettings) -> Self {
        let volume = store.volume().unwrap_or(defaults.volume).clamp(0.0, 1.0);
        output.set_volume(volume);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            output,
            items: Vec::new(),
            playing: None,
            mode: PlayingMode::Paused,
            shuffle: store.shuffle_mode().unwrap_or(defaults.shuffle),
            repeat: store.repeat_mode().unwrap_or(defaults.repeat),
            seek_time: 0.0,
            next_index: 0,
            next_order: 0,
            generation: 0,
            rewind_time: store.rewind_time().unwrap_or(defaults.rewind_seconds).max(0.0),
            skip_time: store.skip_time().unwrap_or(defaults.skip_seconds).max(0.0),
            volume,
            events,
            store,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn playing_index(&self) -> Option<usize> {
        self.playing
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.playing.and_then(|p| self.items.get(p))
    }

    pub fn playing_mode(&self) -> PlayingMode {
        self.mode
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat
    }

    pub fn seek_time(&self) -> f64 {
        self.seek_time
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn rewind_time(&self) -> f64 {
        self.rewind_time
    }

    pub fn skip_time(&self) -> f64 {
        self.skip_time
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    #[cfg(test)]
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_mode(&mut self, mode: PlayingMode) {
        if self.mode != mode {
            self.mode = mode;
            self.emit(QueueEvent::PlayingModeChanged(mode));
        }
    }

    fn position_of(&self, index: u64) -> Option<usize> {
        self.items.iter().position(|item| item.index == index)
    }

    fn current_duration(&self) -> Option<f64> {
        self.output
            .duration()
            .or_else(|| self.current().and_then(|item| item.track.duration))
            .filter(|d| *d > 0.0)
    }

    /// The persisted form: keys in unshuffled order, and the playing item's
    /// position in that order.
    pub fn record(&self) -> QueueRecord {
        let mut canonical: Vec<&QueueItem> = self.items.iter().collect();
        canonical.sort_by_key(|item| item.order);
        let playing_index = self
            .current()
            .and_then(|cur| canonical.iter().position(|item| item.index == cur.index))
            .map(|p| p as i64)
            .unwrap_or(-1);

        QueueRecord {
            tracks: canonical.iter().map(|item| item.track.key.clone()).collect(),
            playing_index,
            seek_time: self.seek_time,
        }
    }

    pub fn persist(&mut self) {
        let record = self.record();
        if let Err(e) = self.store.set_queue(&record).and_then(|()| self.store.save()) {
            log::warn!("could not persist queue: {e}");
        }
    }

    fn save_setting<T: Serialize>(&mut self, key: &str, value: T) {
        if let Err(e) = self.store.set(key, value).and_then(|()| self.store.save()) {
            log::warn!("could not persist `{key}`: {e}");
        }
    }

    fn change_track(&mut self, position: usize, autoplay: bool) {
        let Some(item) = self.items.get(position) else {
            return;
        };
        let track = item.track.clone();
        self.playing = Some(position);
        self.seek_time = 0.0;
        log::debug!("track change: {} ({})", position, track.key);

        let loaded = match self.output.load(&track.key) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e}");
                false
            }
        };
        self.emit(QueueEvent::TrackChanged { position, track });
        self.emit(QueueEvent::Seek {
            elapsed: 0.0,
            fraction: 0.0,
        });

        if autoplay && loaded {
            self.output.play();
            self.set_mode(PlayingMode::Playing);
        } else {
            self.output.pause();
            self.set_mode(PlayingMode::Paused);
        }
        self.persist();
    }

    /// Add `tracks` to the queue.
    ///
    /// A single track that is already queued is selected instead of added
    /// twice. With `insert_after` the new items follow that presentation
    /// position, otherwise they are appended. A shuffled queue is then
    /// reshuffled as a whole. The first enqueue into an idle queue, or any
    /// enqueue with `clear_first`, starts playing the first new item.
    pub fn enqueue(&mut self, tracks: Vec<QueueTrack>, clear_first: bool, insert_after: Option<usize>) {
        if clear_first {
            self.clear();
        }
        if tracks.is_empty() {
            return;
        }
        if let [single] = tracks.as_slice() {
            if let Some(pos) = self.items.iter().position(|item| item.track.key == single.key) {
                log::debug!("{} already queued at {pos}", single.key);
                self.change_track(pos, true);
                return;
            }
        }

        let was_idle = self.playing.is_none();
        let count = tracks.len() as u64;
        let anchor = insert_after.and_then(|p| self.items.get(p).map(|item| (p, item.order)));
        let (first_order, at) = match anchor {
            Some((p, anchor)) => {
                for item in &mut self.items {
                    if item.order > anchor {
                        item.order += count;
                    }
                }
                (anchor + 1, p + 1)
            }
            None => (self.next_order, self.items.len()),
        };
        self.next_order += count;
        let first_new = self.next_index;
        self.next_index += count;

        if let Some(p) = self.playing.filter(|p| *p >= at) {
            self.playing = Some(p + tracks.len());
        }
        let tail = self.items.split_off(at);
        self.items.extend(
            tracks
                .into_iter()
                .zip(first_new..)
                .zip(first_order..)
                .map(|((track, index), order)| QueueItem { index, order, track }),
        );
        self.items.extend(tail);
        self.reorder(self.shuffle);
        log::debug!("enqueued {count} tracks, queue length {}", self.items.len());
        self.emit(QueueEvent::QueueChanged {
            len: self.items.len(),
        });

        match self.position_of(first_new) {
            Some(first_new) if was_idle || clear_first => self.change_track(first_new, true),
            _ => self.persist(),
        }
    }

    /// Start an enqueue whose tracks are still being resolved.
    pub fn begin_enqueue(&self) -> EnqueueTicket {
        EnqueueTicket {
            generation: self.generation,
        }
    }

    /// Complete an enqueue started with [`begin_enqueue`](Self::begin_enqueue).
    /// Returns false, leaving the queue alone, if it was cleared meanwhile.
    pub fn finish_enqueue(
        &mut self,
        ticket: EnqueueTicket,
        tracks: Vec<QueueTrack>,
        clear_first: bool,
        insert_after: Option<usize>,
    ) -> bool {
        if ticket.generation != self.generation {
            log::debug!("dropping {} tracks resolved for a cleared queue", tracks.len());
            return false;
        }
        self.enqueue(tracks, clear_first, insert_after);
        true
    }

    pub fn clear(&mut self) {
        self.output.stop();
        self.items.clear();
        self.playing = None;
        self.seek_time = 0.0;
        self.next_index = 0;
        self.next_order = 0;
        self.generation += 1;
        self.set_mode(PlayingMode::Paused);
        self.emit(QueueEvent::Cleared);
        self.emit(QueueEvent::Seek {
            elapsed: 0.0,
            fraction: 0.0,
        });
        self.persist();
    }

    /// Remove the item at `position`. The selection stays on the same item,
    /// or moves to the one that took the removed item's place.
    pub fn remove(&mut self, position: usize) -> Option<QueueTrack> {
        if position >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(position);
        self.emit(QueueEvent::QueueChanged {
            len: self.items.len(),
        });

        match self.playing {
            Some(p) if p > position => self.playing = Some(p - 1),
            Some(p) if p == position => {
                if self.items.is_empty() {
                    self.output.stop();
                    self.playing = None;
                    self.seek_time = 0.0;
                    self.set_mode(PlayingMode::Paused);
                } else {
                    let autoplay = self.mode == PlayingMode::Playing;
                    self.change_track(position.min(self.items.len() - 1), autoplay);
                    return Some(removed.track);
                }
            }
            _ => {}
        }
        self.persist();
        Some(removed.track)
    }

    /// Rebuild the queue from persisted state without starting playback.
    /// An out-of-range playing index or seek time falls back to 0.
    pub fn restore(&mut self, tracks: Vec<QueueTrack>, record: &QueueRecord) {
        self.output.stop();
        self.items = tracks
            .into_iter()
            .zip(0..)
            .map(|(track, index)| QueueItem {
                index,
                order: index,
                track,
            })
            .collect();
        self.next_index = self.items.len() as u64;
        self.next_order = self.next_index;
        self.playing = None;
        self.seek_time = 0.0;
        self.mode = PlayingMode::Paused;

        let canonical = match usize::try_from(record.playing_index) {
            _ if self.items.is_empty() => None,
            Ok(i) if i < self.items.len() => Some(i as u64),
            _ if record.playing_index == -1 => None,
            _ => {
                log::warn!("persisted playing index {} out of range", record.playing_index);
                Some(0)
            }
        };

        if self.shuffle == ShuffleMode::Shuffled {
            self.items.shuffle(&mut rand::rng());
        }
        self.emit(QueueEvent::QueueChanged {
            len: self.items.len(),
        });

        if let Some(pos) = canonical.and_then(|id| self.position_of(id)) {
            self.change_track(pos, false);
            let duration = self.current_duration();
            let valid = record.seek_time.is_finite()
                && record.seek_time >= 0.0
                && duration.is_none_or(|d| record.seek_time <= d);
            let seek = if valid {
                record.seek_time
            } else {
                log::warn!("persisted seek time {} out of range", record.seek_time);
                0.0
            };
            if seek > 0.0 {
                if let Err(e) = self.output.seek(seek) {
                    log::warn!("{e}");
                }
                self.seek_time = seek;
                self.emit(QueueEvent::Seek {
                    elapsed: seek,
                    fraction: seek_fraction(seek, duration),
                });
            }
        }
        log::info!("restored queue of {} tracks", self.items.len());
        self.persist();
    }

    /// Re-derive the presentation order for `mode`. The playing item stays
    /// selected wherever it lands.
    fn reorder(&mut self, mode: ShuffleMode) {
        let playing_id = self.current().map(|item| item.index);
        match mode {
            ShuffleMode::Normal => self.items.sort_by_key(|item| item.order),
            ShuffleMode::Shuffled => self.items.shuffle(&mut rand::rng()),
        }
        self.playing = playing_id.and_then(|id| self.position_of(id));
    }

    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.reorder(mode);
        self.shuffle = mode;

        self.save_setting(store::SHUFFLE_MODE, mode);
        self.emit(QueueEvent::ShuffleModeChanged(mode));
        self.emit(QueueEvent::QueueChanged {
            len: self.items.len(),
        });
        self.persist();
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat = mode;
        self.save_setting(store::REPEAT_MODE, mode);
        self.emit(QueueEvent::RepeatModeChanged(mode));
    }

    pub fn next(&mut self) {
        let Some(p) = self.playing else {
            if !self.items.is_empty() {
                self.change_track(0, true);
            }
            return;
        };
        if p + 1 < self.items.len() {
            let autoplay = self.mode == PlayingMode::Playing;
            self.change_track(p + 1, autoplay);
            return;
        }

        // End of queue: run out the current track and let repeat decide.
        if let Some(end) = self.current_duration() {
            if let Err(e) = self.output.seek(end) {
                log::debug!("{e}");
            }
            self.seek_time = end;
        }
        self.track_ended();
    }

    /// Early in a track this rewinds it to the start; later it steps back.
    pub fn previous(&mut self) {
        let Some(p) = self.playing else {
            return;
        };
        let threshold = match self.current_duration() {
            Some(d) if d > 10.0 => 5.0,
            _ => 1.0,
        };
        if p == 0 || self.output.elapsed() < threshold {
            self.seek_to(0.0);
        } else {
            let autoplay = self.mode == PlayingMode::Playing;
            self.change_track(p - 1, autoplay);
        }
    }

    /// End-of-track transition.
    pub fn track_ended(&mut self) {
        let Some(p) = self.playing else {
            return;
        };
        let last = p + 1 >= self.items.len();
        match self.repeat {
            RepeatMode::Repeating => self.change_track(p, true),
            RepeatMode::Once if last => self.change_track(0, false),
            RepeatMode::Looping if last => self.change_track(0, true),
            _ => self.change_track(p + 1, true),
        }
    }

    /// Fire the end-of-track transition if the output ran out while playing.
    pub fn check_ended(&mut self) -> bool {
        if self.mode == PlayingMode::Playing && self.playing.is_some() && self.output.is_finished() {
            self.track_ended();
            return true;
        }
        false
    }

    /// Jump to `position` and play it.
    pub fn select(&mut self, position: usize) -> bool {
        if position >= self.items.len() {
            return false;
        }
        self.change_track(position, true);
        true
    }

    pub fn play(&mut self) {
        if self.playing.is_none() {
            if !self.items.is_empty() {
                self.change_track(0, true);
            }
            return;
        }
        self.output.play();
        self.set_mode(PlayingMode::Playing);
    }

    pub fn pause(&mut self) {
        if self.playing.is_none() {
            return;
        }
        self.output.pause();
        self.seek_time = clamp_to_track(self.output.elapsed(), self.current_duration());
        self.set_mode(PlayingMode::Paused);
        self.persist();
    }

    pub fn toggle_play(&mut self) {
        match self.mode {
            PlayingMode::Playing => self.pause(),
            PlayingMode::Paused => self.play(),
        }
    }

    /// Seek within the current track, clamped to `[0, duration]`.
    pub fn seek_to(&mut self, seconds: f64) {
        if self.playing.is_none() {
            return;
        }
        let duration = self.current_duration();
        let target = clamp_to_track(seconds, duration);
        if let Err(e) = self.output.seek(target) {
            log::warn!("{e}");
        }
        self.seek_time = target;
        self.emit(QueueEvent::Seek {
            elapsed: target,
            fraction: seek_fraction(target, duration),
        });
        self.persist();
    }

    pub fn rewind(&mut self) {
        self.seek_to(self.output.elapsed() - self.rewind_time);
    }

    pub fn skip(&mut self) {
        self.seek_to(self.output.elapsed() + self.skip_time);
    }

    pub fn set_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        self.output.set_volume(volume);
        self.save_setting(store::CURRENT_VOLUME, volume);
    }

    /// Sample the output position and publish it. Does nothing unless playing.
    pub fn sync_seek(&mut self) -> Option<f64> {
        if self.mode != PlayingMode::Playing || self.playing.is_none() {
            return None;
        }
        let duration = self.current_duration();
        let elapsed = clamp_to_track(self.output.elapsed(), duration);
        let fraction = seek_fraction(elapsed, duration);
        self.seek_time = elapsed;
        self.emit(QueueEvent::Seek { elapsed, fraction });
        Some(fraction)
    }

    /// `"<n> / <len>"`, with an infinity marker under `repeating`.
    pub fn position_label(&self) -> String {
        let n = self.playing.map(|p| p + 1).unwrap_or(0);
        match self.repeat {
            RepeatMode::Repeating => format!("{n} / ∞"),
            _ => format!("{n} / {}", self.items.len()),
        }
    }
}
