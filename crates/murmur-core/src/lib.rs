//! Murmur Core - layered affirmation playback
//!
//! Plays a user's spoken recording over a background soundscape and a
//! frequency tone, with an optional near-threshold subliminal copy of the
//! same recording underneath.

pub mod audio;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod control;
pub mod engine;
pub mod export;
pub mod tone;
pub mod types;

pub use types::*;
