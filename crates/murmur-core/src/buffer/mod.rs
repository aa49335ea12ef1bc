//! Buffer store: decoding and caching of immutable sample buffers
//!
//! Recordings, soundscapes and frequency tones all end up as a
//! [`SampleBuffer`] behind a [`SharedBuffer`] handle. Any number of playback
//! sources may read the same buffer concurrently.

mod decode;
mod sample_buffer;
mod service;
mod store;

pub use decode::{decode_bytes, DecodeError};
pub use sample_buffer::{same_buffer, SampleBuffer, SharedBuffer};
pub use service::{CancelToken, DecodeService, DecodeServiceHandle, PendingDecode};
pub use store::{BufferKey, BufferStore};

#[cfg(test)]
pub(crate) use decode::wav_fixture;
