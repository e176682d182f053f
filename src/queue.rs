//! Playback queue: ordering, shuffle/repeat, and recovery across restarts.

mod engine;
mod model;
mod resolve;


pub use engine::{EnqueueTicket, QueueEngine};
pub use model::{PlayingMode, QueueEvent, QueueItem, QueueTrack};
pub use resolve::resolve_queue_tracks;
