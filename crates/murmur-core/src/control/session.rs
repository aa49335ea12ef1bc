//! Playback session
//!
//! One engine bound to the output, plus everything the control path keeps
//! about it: gain targets, the subliminal controller, the user's settings,
//! subscribed handlers and decodes started on its behalf. The caller owns
//! the session; the graph manager only keeps a weak reference so it can
//! close a previous session before binding a new one.
//!
//! Sessions are driven from a single control thread. Device streams are not
//! `Send`, so neither is a session.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::automation::{GainAutomation, DEFAULT_RAMP_SECONDS};
use super::error::EngineError;
use super::events::{dispatch_to, EventHandler, HandlerTable, SessionEvent, SubscriptionId};
use super::preset::{MixPreset, PresetKind, PRESET_RAMP_SECONDS};
use super::subliminal::{SubliminalController, SubliminalIntensity, SubliminalMode, SubliminalState};
use crate::audio::{OfflineOutput, OutputHandle, OutputLink};
use crate::buffer::{CancelToken, PendingDecode, SharedBuffer};
use crate::config::EnvironmentSettings;
use crate::engine::{EngineAtomics, EngineCommand, EngineEvent, LoopMode, Shaping, SourceNode};
use crate::types::{GainPath, Layer};

/// Fade applied to the master path around pause and resume
pub const PAUSE_FADE_SECONDS: f64 = 0.05;

/// Fade-in of the initial layers when a session opens
pub const OPEN_FADE_SECONDS: f64 = 0.05;

/// Fade used when a background or frequency source is swapped
pub const LAYER_SWAP_SECONDS: f64 = DEFAULT_RAMP_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Paused,
    /// The output went away; terminal
    Failed,
    Closed,
}

/// A user-adjustable channel of the mix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Vocal,
    Background,
    Frequency,
    Reverb,
}

impl Channel {
    pub fn gain_path(self) -> GainPath {
        match self {
            Channel::Vocal => GainPath::Vocal,
            Channel::Background => GainPath::Background,
            Channel::Frequency => GainPath::Frequency,
            Channel::Reverb => GainPath::ReverbSend,
        }
    }
}

/// Buffers a session starts with
pub struct SessionAssets {
    pub voice: SharedBuffer,
    pub soundscape: Option<SharedBuffer>,
    /// Pre-rendered tone; when `None` the manager synthesizes the selected one
    pub frequency: Option<SharedBuffer>,
}

impl SessionAssets {
    pub fn voice_only(voice: SharedBuffer) -> Self {
        Self {
            voice,
            soundscape: None,
            frequency: None,
        }
    }
}

pub(crate) struct SessionCore {
    id: u64,
    output: Option<OutputHandle>,
    gains: GainAutomation,
    events: rtrb::Consumer<EngineEvent>,
    atomics: Arc<EngineAtomics>,
    subliminal: SubliminalController,
    preset_kind: PresetKind,
    preset: MixPreset,
    /// The user's choices, saved back as-is
    settings: EnvironmentSettings,
    /// Frequency actually playing (a locked choice plays the default)
    active_frequency: Option<String>,
    voice: SharedBuffer,
    state: SessionState,
    failure: Option<String>,
    handlers: HandlerTable,
    pending_decodes: Vec<CancelToken>,
}

impl SessionCore {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Paused)
    }

    fn source(&self, buffer: SharedBuffer, loop_mode: LoopMode) -> Box<SourceNode> {
        Box::new(SourceNode::new(
            buffer,
            Shaping::NEUTRAL,
            loop_mode,
            self.gains.sample_rate(),
        ))
    }

    /// Start the vocal, background and frequency layers and fade them in
    fn start_graph(
        &mut self,
        soundscape: Option<SharedBuffer>,
        frequency: Option<SharedBuffer>,
    ) -> Result<(), EngineError> {
        let vocal = self.source(self.voice.clone(), LoopMode::Count(self.preset.loop_count));
        self.gains.send(EngineCommand::StartSource {
            layer: Layer::Vocal,
            source: vocal,
        })?;
        if let Some(buffer) = soundscape {
            let source = self.source(buffer, LoopMode::Forever);
            self.gains.send(EngineCommand::StartSource {
                layer: Layer::Background,
                source,
            })?;
        }
        if let Some(buffer) = frequency {
            let source = self.source(buffer, LoopMode::Forever);
            self.gains.send(EngineCommand::StartSource {
                layer: Layer::Frequency,
                source,
            })?;
        }

        let levels = [
            (GainPath::Vocal, self.preset.vocal_volume),
            (GainPath::ReverbSend, self.preset.reverb_amount),
            (GainPath::Background, self.settings.background_level(&self.preset)),
            (GainPath::Frequency, self.settings.frequency_level(&self.preset)),
        ];
        for (path, value) in levels {
            self.gains.ramp_to(path, value, OPEN_FADE_SECONDS)?;
        }
        Ok(())
    }

    /// Release everything the session holds
    ///
    /// Safe on a partially built session and safe to repeat.
    fn teardown(&mut self) {
        for token in self.pending_decodes.drain(..) {
            token.cancel();
        }
        if let Err(e) = self.subliminal.destroy(&mut self.gains) {
            log::debug!("Subliminal teardown: {}", e);
        }
        if self.output.is_some() {
            if let Err(e) = self.gains.send(EngineCommand::Shutdown) {
                log::warn!("Session {}: shutdown not delivered: {}", self.id, e);
            }
        }
        self.output = None;
        self.handlers.clear();
        self.gains.reset_targets();
    }

    pub(crate) fn close(&mut self) {
        if !self.is_open() {
            return;
        }
        self.teardown();
        self.state = SessionState::Closed;
        log::info!("Session {} closed", self.id);
    }

    /// Reason the output was lost, if it was
    fn lost_output(&self) -> Option<String> {
        self.output
            .as_ref()
            .filter(|output| output.is_lost())
            .map(|output| output.health().reason().unwrap_or_else(|| "device lost".to_string()))
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        if self.is_open() {
            self.teardown();
        }
    }
}

/// An open playback session
pub struct PlaybackSession {
    core: Rc<RefCell<SessionCore>>,
}

impl PlaybackSession {
    /// Bind a new session to `link` and start its layers
    ///
    /// On failure everything already started is torn down.
    pub(crate) fn start(
        id: u64,
        link: OutputLink,
        preset_kind: PresetKind,
        settings: EnvironmentSettings,
        active_frequency: Option<String>,
        assets: SessionAssets,
    ) -> Result<Self, EngineError> {
        let OutputLink {
            handle,
            command_sender,
            events,
            atomics,
            sample_rate,
            ..
        } = link;

        let mut core = SessionCore {
            id,
            output: Some(handle),
            gains: GainAutomation::new(command_sender, sample_rate),
            events,
            atomics,
            subliminal: SubliminalController::new(),
            preset_kind,
            preset: preset_kind.preset(),
            settings,
            active_frequency,
            voice: assets.voice,
            state: SessionState::Running,
            failure: None,
            handlers: HandlerTable::default(),
            pending_decodes: Vec::new(),
        };

        if let Err(e) = core.start_graph(assets.soundscape, assets.frequency) {
            log::error!("Session {}: failed to start graph: {}", id, e);
            core.teardown();
            core.state = SessionState::Closed;
            return Err(e);
        }

        log::info!(
            "Session {} open: preset {}, {} loops, frequency {}",
            id,
            preset_kind,
            core.preset.loop_count,
            core.active_frequency.as_deref().unwrap_or("none")
        );

        Ok(Self {
            core: Rc::new(RefCell::new(core)),
        })
    }

    pub(crate) fn core(&self) -> &Rc<RefCell<SessionCore>> {
        &self.core
    }

    /// Fail with the session's terminal error, or detect a lost output
    fn ensure_live(&self) -> Result<(), EngineError> {
        let lost = {
            let core = self.core.borrow();
            match core.state {
                SessionState::Closed => return Err(EngineError::SessionClosed),
                SessionState::Failed => {
                    return Err(EngineError::OutputUnavailable(
                        core.failure.clone().unwrap_or_default(),
                    ))
                }
                SessionState::Running | SessionState::Paused => core.lost_output(),
            }
        };

        match lost {
            Some(reason) => {
                self.fail(reason.clone());
                Err(EngineError::OutputUnavailable(reason))
            }
            None => Ok(()),
        }
    }

    /// Tear down after the output went away and tell subscribers
    fn fail(&self, reason: String) {
        let mut handlers = {
            let mut core = self.core.borrow_mut();
            log::error!("Session {}: output lost ({}); session failed", core.id, reason);
            let handlers = core.handlers.detach();
            core.teardown();
            core.state = SessionState::Failed;
            core.failure = Some(reason.clone());
            handlers
        };
        dispatch_to(&mut handlers, &SessionEvent::OutputLost { reason });
    }

    fn with_live<T>(
        &self,
        op: impl FnOnce(&mut SessionCore) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        self.ensure_live()?;
        op(&mut *self.core.borrow_mut())
    }

    pub fn id(&self) -> u64 {
        self.core.borrow().id
    }

    /// Rate the engine renders at
    pub fn sample_rate(&self) -> u32 {
        self.core.borrow().gains.sample_rate()
    }

    pub fn state(&self) -> SessionState {
        self.core.borrow().state
    }

    pub fn preset(&self) -> PresetKind {
        self.core.borrow().preset_kind
    }

    /// The user's current choices, ready to persist
    pub fn settings(&self) -> EnvironmentSettings {
        self.core.borrow().settings.clone()
    }

    pub fn active_frequency(&self) -> Option<String> {
        self.core.borrow().active_frequency.clone()
    }

    /// Last gain requested on a path
    pub fn target_gain(&self, path: GainPath) -> f32 {
        self.core.borrow().gains.target(path)
    }

    /// Lock-free engine telemetry
    pub fn atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.core.borrow().atomics)
    }

    /// The offline renderer driving this session, if it is offline
    pub fn offline(&self) -> Option<OfflineOutput> {
        self.core
            .borrow()
            .output
            .as_ref()
            .and_then(OutputHandle::offline)
            .cloned()
    }

    pub fn output_latency_ms(&self) -> Option<f32> {
        self.core.borrow().output.as_ref().map(OutputHandle::latency_ms)
    }

    /// Ramp every channel to `kind`'s levels over a shared window
    ///
    /// A later call before the ramps finish retargets them; the newest
    /// preset wins. The vocal's loop count applies from the next voice.
    /// Background and frequency overrides are dropped so both levels follow
    /// the preset again.
    pub fn apply_preset(&self, kind: PresetKind) -> Result<(), EngineError> {
        self.with_live(|core| {
            let preset = kind.preset();
            let levels = [
                (GainPath::Vocal, preset.vocal_volume),
                (GainPath::ReverbSend, preset.reverb_amount),
                (GainPath::Background, preset.background_volume),
                (GainPath::Frequency, preset.frequency_volume),
            ];
            for (path, value) in levels {
                core.gains.ramp_to(path, value, PRESET_RAMP_SECONDS)?;
            }

            core.preset_kind = kind;
            core.preset = preset;
            core.settings.preset = kind;
            core.settings.background_volume = None;
            core.settings.frequency_volume = None;
            log::info!("Session {}: preset -> {}", core.id, kind);
            Ok(())
        })
    }

    /// User override of a single channel's level
    pub fn set_channel_volume(&self, channel: Channel, value: f32) -> Result<(), EngineError> {
        self.with_live(|core| {
            core.gains.ramp_to(channel.gain_path(), value, DEFAULT_RAMP_SECONDS)?;
            match channel {
                Channel::Background => core.settings.background_volume = Some(value),
                Channel::Frequency => core.settings.frequency_volume = Some(value),
                Channel::Vocal => core.preset.vocal_volume = value,
                Channel::Reverb => core.preset.reverb_amount = value,
            }
            Ok(())
        })
    }

    /// Swap the background soundscape (or remove it with `None`)
    ///
    /// Not tier-checked; callers go through
    /// [`AudioGraphManager::set_soundscape`](super::AudioGraphManager::set_soundscape).
    pub(crate) fn set_soundscape(&self, id: Option<&str>, buffer: Option<SharedBuffer>) -> Result<(), EngineError> {
        self.with_live(|core| {
            let source = buffer.map(|b| core.source(b, LoopMode::Forever));
            let fade_frames = core.gains.frames(LAYER_SWAP_SECONDS);
            core.gains.send(EngineCommand::ReplaceSource {
                layer: Layer::Background,
                source,
                fade_frames,
            })?;
            core.settings.soundscape_id = id.map(str::to_string);
            log::info!("Session {}: soundscape -> {}", core.id, id.unwrap_or("none"));
            Ok(())
        })
    }

    /// Swap the frequency tone (or remove it with `None`)
    ///
    /// Not tier-checked; callers go through
    /// [`AudioGraphManager::set_frequency`](super::AudioGraphManager::set_frequency).
    pub(crate) fn set_frequency(&self, id: Option<&str>, buffer: Option<SharedBuffer>) -> Result<(), EngineError> {
        self.with_live(|core| {
            let source = buffer.map(|b| core.source(b, LoopMode::Forever));
            let fade_frames = core.gains.frames(LAYER_SWAP_SECONDS);
            core.gains.send(EngineCommand::ReplaceSource {
                layer: Layer::Frequency,
                source,
                fade_frames,
            })?;
            core.settings.frequency_id = id.map(str::to_string);
            core.active_frequency = id.map(str::to_string);
            log::info!("Session {}: frequency -> {}", core.id, id.unwrap_or("none"));
            Ok(())
        })
    }

    /// Replace the recording; a playing subliminal layer follows it
    pub fn set_voice(&self, voice: SharedBuffer) -> Result<(), EngineError> {
        self.with_live(|core| {
            let source = core.source(voice.clone(), LoopMode::Count(core.preset.loop_count));
            let fade_frames = core.gains.frames(LAYER_SWAP_SECONDS);
            core.gains.send(EngineCommand::ReplaceSource {
                layer: Layer::Vocal,
                source: Some(source),
                fade_frames,
            })?;

            if let SubliminalState::Playing { mode, intensity } = core.subliminal.state() {
                core.subliminal
                    .start(&mut core.gains, voice.clone(), mode, intensity)?;
            }
            core.voice = voice;
            log::info!("Session {}: voice replaced", core.id);
            Ok(())
        })
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.with_live(|core| {
            if core.state == SessionState::Paused {
                return Ok(());
            }
            core.gains.ramp_to(GainPath::Master, 0.0, PAUSE_FADE_SECONDS)?;
            core.gains.send(EngineCommand::Pause)?;
            core.state = SessionState::Paused;
            Ok(())
        })
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.with_live(|core| {
            if core.state == SessionState::Running {
                return Ok(());
            }
            core.gains.send(EngineCommand::Resume)?;
            core.gains.ramp_to(GainPath::Master, 1.0, PAUSE_FADE_SECONDS)?;
            core.state = SessionState::Running;
            Ok(())
        })
    }

    /// Start the subliminal layer on the current recording
    pub fn start_subliminal(
        &self,
        mode: SubliminalMode,
        intensity: SubliminalIntensity,
    ) -> Result<(), EngineError> {
        self.with_live(|core| {
            let voice = core.voice.clone();
            core.subliminal.start(&mut core.gains, voice, mode, intensity)?;
            core.settings.subliminal_on = true;
            core.settings.subliminal_mode = mode;
            core.settings.subliminal_intensity = intensity;
            Ok(())
        })
    }

    pub fn update_subliminal_intensity(&self, intensity: SubliminalIntensity) -> Result<(), EngineError> {
        self.with_live(|core| {
            core.subliminal.update_intensity(&mut core.gains, intensity)?;
            core.settings.subliminal_intensity = intensity;
            Ok(())
        })
    }

    pub fn update_subliminal_mode(&self, mode: SubliminalMode) -> Result<(), EngineError> {
        self.with_live(|core| {
            core.subliminal.update_mode(&mut core.gains, mode)?;
            core.settings.subliminal_mode = mode;
            Ok(())
        })
    }

    pub fn stop_subliminal(&self) -> Result<(), EngineError> {
        self.with_live(|core| {
            core.subliminal.stop(&mut core.gains)?;
            core.settings.subliminal_on = false;
            Ok(())
        })
    }

    /// Retire the subliminal layer for the rest of this session
    pub fn destroy_subliminal(&self) -> Result<(), EngineError> {
        self.with_live(|core| core.subliminal.destroy(&mut core.gains))
    }

    pub fn subliminal_state(&self) -> SubliminalState {
        self.core.borrow().subliminal.state()
    }

    pub fn subscribe(&self, handler: impl FnMut(&SessionEvent) + 'static) -> SubscriptionId {
        let handler: EventHandler = Box::new(handler);
        self.core.borrow_mut().handlers.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.borrow_mut().handlers.unsubscribe(id)
    }

    /// Drain engine notifications and hand them to subscribers
    ///
    /// Also the point where a lost output is noticed. Handlers may call
    /// back into the session.
    pub fn poll_events(&self) -> Result<Vec<SessionEvent>, EngineError> {
        self.ensure_live()?;

        let (events, mut handlers) = {
            let mut core = self.core.borrow_mut();
            let mut events = Vec::new();
            while let Ok(event) = core.events.pop() {
                events.push(SessionEvent::from(event));
            }
            if events.is_empty() {
                return Ok(events);
            }
            (events, core.handlers.detach())
        };

        for event in &events {
            dispatch_to(&mut handlers, event);
        }

        let mut core = self.core.borrow_mut();
        if core.is_open() {
            core.handlers.restore(handlers);
        }
        Ok(events)
    }

    /// Cancel `pending` if the session closes before it resolves
    pub fn track_decode(&self, pending: &PendingDecode) {
        let mut core = self.core.borrow_mut();
        if core.is_open() {
            core.pending_decodes.push(pending.cancel_token());
        } else {
            pending.cancel();
        }
    }

    /// Stop every layer, cancel ramps and decodes, release the output
    ///
    /// Idempotent; a failed session stays Failed.
    pub fn close(&self) {
        self.core.borrow_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::audio::OutputConfig;
    use crate::buffer::{BufferKey, DecodeError, SampleBuffer};
    use crate::catalog::Tier;
    use crate::control::AudioGraphManager;

    fn voice(seconds: f32) -> SharedBuffer {
        let frames = (48000.0 * seconds) as usize;
        let samples: Vec<f32> = (0..frames).map(|i| ((i as f32) * 0.03).sin() * 0.4).collect();
        SampleBuffer::from_interleaved(&samples, 1, 48000).into_shared()
    }

    fn open(manager: &mut AudioGraphManager, preset: PresetKind) -> PlaybackSession {
        manager
            .open(
                preset,
                &EnvironmentSettings::default(),
                SessionAssets::voice_only(voice(0.5)),
                &Tier::Free,
            )
            .unwrap()
    }

    fn manager() -> AudioGraphManager {
        AudioGraphManager::new(OutputConfig::offline()).unwrap()
    }

    #[test]
    fn test_open_starts_layers_at_preset_levels() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let output = session.offline().unwrap();
        output.render_seconds(0.2).unwrap();

        let atomics = session.atomics();
        assert_eq!(atomics.gain(GainPath::Vocal), 0.85);
        assert_eq!(atomics.gain(GainPath::ReverbSend), 0.40);
        assert_eq!(atomics.gain(GainPath::Frequency), 0.25);
        assert!(atomics.is_source_active(Layer::Vocal));
        assert!(atomics.is_source_active(Layer::Frequency));
        assert!(!atomics.is_source_active(Layer::Background));
        assert_eq!(session.subliminal_state(), SubliminalState::Idle);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_open_on_sleep_uses_sleep_levels() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Sleep);
        session.offline().unwrap().render_seconds(0.2).unwrap();

        let atomics = session.atomics();
        assert_eq!(atomics.gain(GainPath::Vocal), 0.63);
        assert_eq!(atomics.gain(GainPath::ReverbSend), 0.55);
        assert_eq!(atomics.gain(GainPath::Background), 0.30);
        assert_eq!(atomics.gain(GainPath::Frequency), 0.42);
        assert_eq!(session.settings().background_volume, None);
    }

    #[test]
    fn test_saved_level_overrides_preset_at_open() {
        let mut manager = manager();
        let settings = EnvironmentSettings {
            frequency_volume: Some(0.1),
            ..Default::default()
        };
        let session = manager
            .open(PresetKind::Sleep, &settings, SessionAssets::voice_only(voice(0.5)), &Tier::Free)
            .unwrap();
        session.offline().unwrap().render_seconds(0.2).unwrap();

        let atomics = session.atomics();
        assert_eq!(atomics.gain(GainPath::Frequency), 0.1);
        assert_eq!(atomics.gain(GainPath::Background), 0.30);

        session.set_channel_volume(Channel::Background, 0.5).unwrap();
        assert_eq!(session.settings().background_volume, Some(0.5));
        session.apply_preset(PresetKind::Optimal).unwrap();
        assert_eq!(session.settings().background_volume, None);
        assert_eq!(session.settings().frequency_volume, None);
    }

    #[test]
    fn test_vocal_loops_then_finishes() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let finished = Rc::new(Cell::new(false));
        let flag = Rc::clone(&finished);
        session.subscribe(move |event| {
            if *event == SessionEvent::VocalFinished {
                flag.set(true);
            }
        });

        // Three passes of half a second
        session.offline().unwrap().render_seconds(1.6).unwrap();
        let events = session.poll_events().unwrap();

        let loops: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::VocalLoopCompleted { loops } => Some(*loops),
                _ => None,
            })
            .collect();
        assert_eq!(loops, vec![1, 2, 3]);
        assert!(finished.get());
        assert_eq!(session.atomics().vocal_loops(), 3);
    }

    #[test]
    fn test_preset_retarget_converges_on_newest() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let output = session.offline().unwrap();
        output.render_seconds(0.1).unwrap();

        session.apply_preset(PresetKind::Sleep).unwrap();
        output.render_seconds(0.1).unwrap();
        session.apply_preset(PresetKind::Optimal).unwrap();
        output.render_seconds(0.6).unwrap();

        let atomics = session.atomics();
        assert_eq!(atomics.gain(GainPath::Vocal), 0.85);
        assert_eq!(atomics.gain(GainPath::ReverbSend), 0.40);
        assert_eq!(atomics.gain(GainPath::Background), 0.20);
        assert_eq!(atomics.gain(GainPath::Frequency), 0.25);
        assert_eq!(session.preset(), PresetKind::Optimal);
    }

    #[test]
    fn test_optimal_to_sleep_settles() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let output = session.offline().unwrap();
        output.render_seconds(0.1).unwrap();

        session.apply_preset(PresetKind::Sleep).unwrap();
        output.render_seconds(0.2).unwrap();
        let midway = session.atomics().gain(GainPath::Background);
        assert!(midway > 0.20 && midway < 0.30, "midway {}", midway);

        output.render_seconds(0.3).unwrap();
        let atomics = session.atomics();
        assert_eq!(atomics.gain(GainPath::Background), 0.30);
        assert_eq!(atomics.gain(GainPath::Frequency), 0.42);
        assert_eq!(session.settings().preset, PresetKind::Sleep);
        assert_eq!(session.settings().background_volume, None);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let output = session.offline().unwrap();
        output.render_seconds(0.1).unwrap();

        session.pause().unwrap();
        output.render_seconds(0.1).unwrap();
        let atomics = session.atomics();
        assert!(atomics.is_paused());
        let frozen = atomics.frames_rendered();
        let silent = output.render_seconds(0.1).unwrap();
        assert_eq!(silent.peak(), 0.0);
        assert_eq!(atomics.frames_rendered(), frozen);
        assert!(session.poll_events().unwrap().contains(&SessionEvent::Paused));

        session.resume().unwrap();
        output.render_seconds(0.1).unwrap();
        assert!(!atomics.is_paused());
        assert_eq!(atomics.gain(GainPath::Master), 1.0);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Sleep);
        let atomics = session.atomics();
        let output = session.offline().unwrap();

        session.close();
        output.render(256).unwrap();
        assert!(atomics.is_halted());
        assert_eq!(session.state(), SessionState::Closed);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.apply_preset(PresetKind::Optimal), Err(EngineError::SessionClosed));
        assert_eq!(session.poll_events(), Err(EngineError::SessionClosed));
        assert!(session.offline().is_none());
    }

    #[test]
    fn test_close_mid_ramp_silences() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        session.start_subliminal(SubliminalMode::Echo, SubliminalIntensity::High).unwrap();
        let output = session.offline().unwrap();
        output.render(512).unwrap();

        session.close();
        let after = output.render_seconds(0.2).unwrap();
        assert_eq!(after.peak(), 0.0);
        let atomics = session.atomics();
        for layer in Layer::ALL {
            assert!(!atomics.is_source_active(layer));
        }
    }

    #[test]
    fn test_revoked_output_fails_session() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let lost = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&lost);
        session.subscribe(move |event| {
            if let SessionEvent::OutputLost { reason } = event {
                *sink.borrow_mut() = Some(reason.clone());
            }
        });

        session.offline().unwrap().revoke();
        let err = session.set_channel_volume(Channel::Background, 0.5).unwrap_err();
        assert!(matches!(err, EngineError::OutputUnavailable(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(lost.borrow().as_deref(), Some("output revoked"));
        assert!(err.user_message().contains("Audio device unavailable"));

        // Terminal: no reconnection, close leaves it Failed
        assert!(matches!(session.poll_events(), Err(EngineError::OutputUnavailable(_))));
        session.close();
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_close_cancels_pending_decode() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        let bytes = crate::buffer::wav_fixture(&[0.1; 48000], 1, 48000);
        let pending = manager.load_voice(&session, bytes, Some("wav"));

        session.close();
        assert_eq!(pending.wait().map(|_| ()), Err(DecodeError::Cancelled));
        assert!(!manager.store().contains(&BufferKey::Recording));
    }

    #[test]
    fn test_set_voice_restarts_subliminal_on_new_recording() {
        let mut manager = manager();
        let session = open(&mut manager, PresetKind::Optimal);
        session.start_subliminal(SubliminalMode::Rapid, SubliminalIntensity::Low).unwrap();
        let output = session.offline().unwrap();
        output.render_seconds(0.5).unwrap();

        session.set_voice(voice(1.0)).unwrap();
        output.render_seconds(1.0).unwrap();

        let atomics = session.atomics();
        assert_eq!(atomics.sources_started(Layer::Vocal), 2);
        assert_eq!(atomics.sources_started(Layer::Subliminal), 2);
        assert_eq!(atomics.gain(GainPath::Subliminal), 0.03);
        assert_eq!(
            session.subliminal_state(),
            SubliminalState::Playing { mode: SubliminalMode::Rapid, intensity: SubliminalIntensity::Low }
        );
    }

    #[test]
    fn test_handler_may_close_session() {
        let mut manager = manager();
        let session = Rc::new(open(&mut manager, PresetKind::Optimal));
        let inner = Rc::clone(&session);
        session.subscribe(move |event| {
            if *event == SessionEvent::VocalFinished {
                inner.close();
            }
        });

        session.offline().unwrap().render_seconds(1.6).unwrap();
        session.poll_events().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
