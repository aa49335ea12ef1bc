//! Audio graph manager
//!
//! Opens playback sessions on the configured output and resolves what each
//! one plays: the recording, a cached soundscape and a synthesized frequency
//! tone, gated by the listener's tier. At most one session is bound to the
//! output; opening a new one closes the previous session first.
//!
//! Soundscape and frequency swaps are only reachable through the manager,
//! which applies the tier check; the session's own swap methods are
//! crate-private:
//!
//! ```compile_fail
//! use murmur_core::control::PlaybackSession;
//!
//! fn play_locked_tone(session: &PlaybackSession) {
//!     let _ = session.set_frequency(Some("963hz"), None);
//! }
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::error::EngineError;
use super::preset::PresetKind;
use super::session::{PlaybackSession, SessionAssets, SessionCore};
use crate::audio::{start_output, OutputConfig};
use crate::buffer::{BufferKey, BufferStore, PendingDecode, SampleBuffer, SharedBuffer};
use crate::catalog::{is_frequency_allowed, is_soundscape_allowed, TierOracle, DEFAULT_FREQUENCY};
use crate::config::EnvironmentSettings;

pub struct AudioGraphManager {
    output_config: OutputConfig,
    store: BufferStore,
    /// Session currently bound to the output
    bound: Weak<RefCell<SessionCore>>,
    next_id: u64,
}

impl AudioGraphManager {
    pub fn new(output_config: OutputConfig) -> Result<Self, EngineError> {
        Ok(Self {
            output_config,
            store: BufferStore::new()?,
            bound: Weak::new(),
            next_id: 1,
        })
    }

    pub fn output_config(&self) -> &OutputConfig {
        &self.output_config
    }

    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BufferStore {
        &mut self.store
    }

    /// Id of the session bound to the output, if it is still open
    pub fn bound_session(&self) -> Option<u64> {
        let core = self.bound.upgrade()?;
        let core = core.borrow();
        core.is_open().then_some(core.id())
    }

    fn close_bound(&mut self) {
        if let Some(core) = self.bound.upgrade() {
            core.borrow_mut().close();
        }
        self.bound = Weak::new();
    }

    /// Open a session and start its vocal, background and frequency layers
    ///
    /// A frequency the tier does not unlock plays the default tone for this
    /// session only; the returned session still reports the user's choice
    /// in [`PlaybackSession::settings`]. The subliminal layer starts Idle.
    pub fn open(
        &mut self,
        preset: PresetKind,
        settings: &EnvironmentSettings,
        assets: SessionAssets,
        tier: &dyn TierOracle,
    ) -> Result<PlaybackSession, EngineError> {
        self.close_bound();

        let tier = tier.current_tier();
        let playable = settings.clone().for_tier(tier);

        let link = start_output(&self.output_config).map_err(|e| {
            log::error!("Failed to open audio output: {}", e);
            EngineError::from(e)
        })?;
        let sample_rate = link.sample_rate;

        let soundscape = match playable.soundscape_id.as_deref() {
            Some(id) => assets
                .soundscape
                .or_else(|| self.store.get(&BufferKey::Soundscape(id.to_string()))),
            None if settings.soundscape_id.is_some() => None,
            None => assets.soundscape,
        };
        if soundscape.is_none() {
            if let Some(id) = playable.soundscape_id.as_deref() {
                log::warn!("Soundscape '{}' is not loaded; background stays silent", id);
            }
        }

        let active_frequency = playable.frequency_id.clone();
        let downgraded = active_frequency != settings.frequency_id;
        let frequency = match active_frequency.as_deref() {
            Some(_) if !downgraded && assets.frequency.is_some() => assets.frequency,
            Some(id) => self.tone(id, sample_rate),
            None => None,
        };

        let mut user = settings.clone();
        user.preset = preset;
        user.background_volume = playable.background_volume;
        user.frequency_volume = playable.frequency_volume;

        let id = self.next_id;
        self.next_id += 1;

        let assets = SessionAssets {
            voice: assets.voice,
            soundscape,
            frequency,
        };
        let session = PlaybackSession::start(id, link, preset, user, active_frequency, assets)?;
        self.bound = Rc::downgrade(session.core());
        Ok(session)
    }

    fn tone(&mut self, id: &str, sample_rate: u32) -> Option<SharedBuffer> {
        let tone = self.store.frequency_tone(id, sample_rate);
        if tone.is_none() {
            log::warn!("Unknown frequency '{}'; no tone", id);
        }
        tone
    }

    pub fn apply_preset(&self, session: &PlaybackSession, preset: PresetKind) -> Result<(), EngineError> {
        session.apply_preset(preset)
    }

    /// Close `session` and unbind it from the output
    pub fn close(&mut self, session: &PlaybackSession) {
        session.close();
        if self
            .bound
            .upgrade()
            .is_some_and(|core| Rc::ptr_eq(&core, session.core()))
        {
            self.bound = Weak::new();
        }
    }

    /// Decode a new recording for `session` in the background
    ///
    /// The decode is cancelled if the session closes first. Install the
    /// result with [`AudioGraphManager::install_voice`].
    pub fn load_voice(
        &self,
        session: &PlaybackSession,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> PendingDecode {
        let pending = self.store.decode(bytes, extension);
        session.track_decode(&pending);
        pending
    }

    /// Swap a decoded recording into `session` and cache it
    ///
    /// The cache only changes once the session has taken the recording, so a
    /// closed or failed session leaves the cached recording as it was.
    pub fn install_voice(
        &mut self,
        session: &PlaybackSession,
        buffer: SampleBuffer,
    ) -> Result<(), EngineError> {
        let voice = buffer.into_shared();
        session.set_voice(voice.clone())?;
        self.store.insert_shared(BufferKey::Recording, voice);
        Ok(())
    }

    /// Decode and cache a soundscape (blocking)
    pub fn load_soundscape(
        &mut self,
        id: &str,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<SharedBuffer, EngineError> {
        let buffer = self
            .store
            .load(BufferKey::Soundscape(id.to_string()), bytes, extension)?;
        log::info!("Soundscape '{}' loaded ({:.1}s)", id, buffer.duration_seconds());
        Ok(buffer)
    }

    /// Switch the background to a cached soundscape (or none)
    ///
    /// A soundscape the tier does not unlock, or one not loaded, leaves the
    /// background silent.
    pub fn set_soundscape(
        &self,
        session: &PlaybackSession,
        id: Option<&str>,
        tier: &dyn TierOracle,
    ) -> Result<(), EngineError> {
        let tier = tier.current_tier();
        let id = id.filter(|id| {
            let allowed = is_soundscape_allowed(id, tier);
            if !allowed {
                log::warn!("Soundscape '{}' is locked for tier {}", id, tier);
            }
            allowed
        });
        let buffer = id.and_then(|id| self.store.get(&BufferKey::Soundscape(id.to_string())));
        if buffer.is_none() {
            if let Some(id) = id {
                log::warn!("Soundscape '{}' is not loaded; background stays silent", id);
            }
        }
        session.set_soundscape(id, buffer)
    }

    /// Switch the frequency tone (or none)
    ///
    /// A frequency the tier does not unlock plays the default tone instead.
    pub fn set_frequency(
        &mut self,
        session: &PlaybackSession,
        id: Option<&str>,
        tier: &dyn TierOracle,
    ) -> Result<(), EngineError> {
        let tier = tier.current_tier();
        let id = id.map(|id| {
            if is_frequency_allowed(id, tier) {
                id
            } else {
                log::warn!("Frequency '{}' is locked for tier {}; using {}", id, tier, DEFAULT_FREQUENCY);
                DEFAULT_FREQUENCY
            }
        });
        let buffer = id.and_then(|id| self.tone(id, session.sample_rate()));
        session.set_frequency(id, buffer)
    }
}
