//! Configuration loader and schema types.
//!
//! This module exposes the static settings that drive the library indexer,
//! the queue engine and the network layer, plus helpers to load them from
//! disk and the environment.

mod load;
mod schema;

pub use load::*;
pub use schema::*;
