//! Keyed cache of decoded buffers

use std::collections::HashMap;

use super::decode::DecodeError;
use super::sample_buffer::{SampleBuffer, SharedBuffer};
use super::service::{DecodeService, DecodeServiceHandle, PendingDecode};
use crate::catalog::frequency;
use crate::tone;

/// What a cached buffer holds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferKey {
    /// The user's spoken affirmation
    Recording,
    /// A background soundscape by catalog id
    Soundscape(String),
    /// A frequency tone by catalog id
    Frequency(String),
}

/// Decodes raw bytes off-thread and caches the results by key
///
/// A failed decode never installs anything, so a bad recording leaves any
/// previously cached buffer in place.
pub struct BufferStore {
    service: DecodeServiceHandle,
    buffers: HashMap<BufferKey, SharedBuffer>,
}

impl BufferStore {
    pub fn new() -> Result<Self, DecodeError> {
        Ok(Self {
            service: DecodeService::spawn()?,
            buffers: HashMap::new(),
        })
    }

    /// Start decoding on the background service
    pub fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> PendingDecode {
        self.service.decode(bytes, extension)
    }

    /// Decode and cache in one blocking call
    pub fn load(
        &mut self,
        key: BufferKey,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<SharedBuffer, DecodeError> {
        let buffer = self.decode(bytes, extension).wait()?;
        Ok(self.insert(key, buffer))
    }

    /// Install a decoded buffer, replacing whatever the key held
    pub fn insert(&mut self, key: BufferKey, buffer: SampleBuffer) -> SharedBuffer {
        let shared = buffer.into_shared();
        self.insert_shared(key, shared.clone());
        shared
    }

    /// Install a buffer that is already shared (for example, already playing)
    pub fn insert_shared(&mut self, key: BufferKey, buffer: SharedBuffer) {
        self.buffers.insert(key, buffer);
    }

    pub fn get(&self, key: &BufferKey) -> Option<SharedBuffer> {
        self.buffers.get(key).cloned()
    }

    /// Drop the store's reference; sources still playing it keep theirs
    pub fn remove(&mut self, key: &BufferKey) -> Option<SharedBuffer> {
        self.buffers.remove(key)
    }

    pub fn contains(&self, key: &BufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    /// Synthesized tone for a catalog frequency, cached per id
    ///
    /// Returns `None` for ids the catalog does not know.
    pub fn frequency_tone(&mut self, id: &str, sample_rate: u32) -> Option<SharedBuffer> {
        let key = BufferKey::Frequency(id.to_string());
        if let Some(buffer) = self.buffers.get(&key) {
            if buffer.sample_rate() == sample_rate {
                return Some(buffer.clone());
            }
        }

        let info = frequency::lookup(id)?;
        let buffer = tone::render_tone(info.hz, sample_rate);
        Some(self.insert(key, buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::decode::wav_fixture;
    use crate::buffer::sample_buffer::same_buffer;

    #[test]
    fn test_load_and_get() {
        let mut store = BufferStore::new().unwrap();
        let loaded = store
            .load(BufferKey::Recording, wav_fixture(&[0.3; 960], 1, 48000), None)
            .unwrap();
        let cached = store.get(&BufferKey::Recording).unwrap();
        assert!(same_buffer(&loaded, &cached));
    }

    #[test]
    fn test_failed_decode_keeps_previous_buffer() {
        let mut store = BufferStore::new().unwrap();
        let original = store
            .load(BufferKey::Recording, wav_fixture(&[0.3; 960], 1, 48000), None)
            .unwrap();

        let result = store.load(BufferKey::Recording, b"garbage".to_vec(), None);
        assert!(matches!(result, Err(DecodeError::InvalidAudio(_))));
        assert!(same_buffer(&original, &store.get(&BufferKey::Recording).unwrap()));
    }

    #[test]
    fn test_frequency_tone_cached() {
        let mut store = BufferStore::new().unwrap();
        let a = store.frequency_tone("417hz", 48000).unwrap();
        let b = store.frequency_tone("417hz", 48000).unwrap();
        assert!(same_buffer(&a, &b));
        assert!(store.frequency_tone("1234hz", 48000).is_none());
    }

    #[test]
    fn test_removed_buffer_outlives_store_entry() {
        let mut store = BufferStore::new().unwrap();
        let buffer = store.insert(
            BufferKey::Soundscape("rain".into()),
            SampleBuffer::from_interleaved(&[0.1; 64], 2, 48000),
        );
        store.remove(&BufferKey::Soundscape("rain".into()));
        assert!(!store.contains(&BufferKey::Soundscape("rain".into())));
        assert_eq!(buffer.len(), 32);
    }
}
