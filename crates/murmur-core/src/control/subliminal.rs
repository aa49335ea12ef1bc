//! Subliminal layer controller
//!
//! Drives the near-threshold copy of the user's own recording. Mode picks
//! the shaping (rate and detune), intensity picks the gain; the two are
//! independent and changing one never resets the other.
//!
//! ```text
//!            start                stop
//!   Idle ───────────────► Playing ─────► Idle
//!    │                      │
//!    └──── destroy ─────────┴──── destroy ───► Destroyed (terminal)
//! ```
//!
//! While the intensity is Off no source is ever allocated, so changing the
//! mode then only records it for later. A source that already exists when
//! intensity drops to Off is faded to silence and kept.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::automation::{GainAutomation, DEFAULT_RAMP_SECONDS};
use super::error::EngineError;
use crate::buffer::{same_buffer, SharedBuffer};
use crate::engine::{EngineCommand, LoopMode, Shaping, SourceNode};
use crate::types::{GainPath, Layer};

/// Crossfade used when a playing source is restarted with new shaping
pub const RESTART_FADE_SECONDS: f64 = 0.05;

/// Shaping of the subliminal copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubliminalMode {
    /// Lowered a whole tone, natural speed
    #[default]
    Echo,
    /// Fast and slightly lowered
    Rapid,
}

impl SubliminalMode {
    pub const ALL: [SubliminalMode; 2] = [SubliminalMode::Echo, SubliminalMode::Rapid];

    pub fn shaping(self) -> Shaping {
        match self {
            SubliminalMode::Echo => Shaping {
                playback_rate: 1.0,
                detune_cents: -200.0,
            },
            SubliminalMode::Rapid => Shaping {
                playback_rate: 1.7,
                detune_cents: -100.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SubliminalMode::Echo => "echo",
            SubliminalMode::Rapid => "rapid",
        }
    }
}

impl fmt::Display for SubliminalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubliminalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "echo" => Ok(SubliminalMode::Echo),
            "rapid" => Ok(SubliminalMode::Rapid),
            other => Err(format!("unknown subliminal mode '{}'", other)),
        }
    }
}

/// How loud the subliminal copy sits under the vocal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubliminalIntensity {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl SubliminalIntensity {
    pub const ALL: [SubliminalIntensity; 4] = [
        SubliminalIntensity::Off,
        SubliminalIntensity::Low,
        SubliminalIntensity::Medium,
        SubliminalIntensity::High,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SubliminalIntensity::Off => "off",
            SubliminalIntensity::Low => "low",
            SubliminalIntensity::Medium => "medium",
            SubliminalIntensity::High => "high",
        }
    }
}

impl fmt::Display for SubliminalIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubliminalIntensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(SubliminalIntensity::Off),
            "low" => Ok(SubliminalIntensity::Low),
            "medium" => Ok(SubliminalIntensity::Medium),
            "high" => Ok(SubliminalIntensity::High),
            other => Err(format!("unknown subliminal intensity '{}'", other)),
        }
    }
}

/// Fixed gain for an intensity
pub fn resolve_gain(intensity: SubliminalIntensity) -> f32 {
    match intensity {
        SubliminalIntensity::Off => 0.0,
        SubliminalIntensity::Low => 0.03,
        SubliminalIntensity::Medium => 0.08,
        SubliminalIntensity::High => 0.14,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubliminalState {
    Idle,
    Playing {
        mode: SubliminalMode,
        intensity: SubliminalIntensity,
    },
    Destroyed,
}

pub struct SubliminalController {
    state: SubliminalState,
    /// Mode to use for the next source built
    pending_mode: SubliminalMode,
    buffer: Option<SharedBuffer>,
    /// Shaping of the source currently on the engine, if any
    live_mode: Option<SubliminalMode>,
}

impl SubliminalController {
    pub fn new() -> Self {
        Self {
            state: SubliminalState::Idle,
            pending_mode: SubliminalMode::default(),
            buffer: None,
            live_mode: None,
        }
    }

    pub fn state(&self) -> SubliminalState {
        self.state
    }

    /// Mode the next source will be built with
    pub fn pending_mode(&self) -> SubliminalMode {
        self.pending_mode
    }

    /// Whether a source is currently allocated on the engine
    pub fn has_source(&self) -> bool {
        self.live_mode.is_some()
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        match self.state {
            SubliminalState::Destroyed => Err(EngineError::SubliminalDestroyed),
            _ => Ok(()),
        }
    }

    fn build_source(&self, buffer: &SharedBuffer, mode: SubliminalMode, sample_rate: u32) -> Box<SourceNode> {
        Box::new(SourceNode::new(
            buffer.clone(),
            mode.shaping(),
            LoopMode::Forever,
            sample_rate,
        ))
    }

    /// Put a fresh source for `mode` on the engine and fade it to `intensity`
    fn launch(
        &mut self,
        gains: &mut GainAutomation,
        buffer: &SharedBuffer,
        mode: SubliminalMode,
        intensity: SubliminalIntensity,
    ) -> Result<(), EngineError> {
        let source = self.build_source(buffer, mode, gains.sample_rate());

        if self.live_mode.is_some() {
            // Fade the old source out, swap at silence, fade the new one in
            gains.send(EngineCommand::ReplaceSource {
                layer: Layer::Subliminal,
                source: Some(source),
                fade_frames: gains.frames(RESTART_FADE_SECONDS),
            })?;
        } else {
            // Nothing is sounding on the path yet
            gains.set_immediate(GainPath::Subliminal, 0.0)?;
            gains.send(EngineCommand::StartSource {
                layer: Layer::Subliminal,
                source,
            })?;
        }
        self.live_mode = Some(mode);

        gains.ramp_to(GainPath::Subliminal, resolve_gain(intensity), DEFAULT_RAMP_SECONDS)
    }

    /// Start (or restart) playback of `buffer`
    ///
    /// Calling again with the same buffer, mode and intensity is a no-op.
    pub fn start(
        &mut self,
        gains: &mut GainAutomation,
        buffer: SharedBuffer,
        mode: SubliminalMode,
        intensity: SubliminalIntensity,
    ) -> Result<(), EngineError> {
        self.ensure_alive()?;

        if let SubliminalState::Playing {
            mode: current_mode,
            intensity: current_intensity,
        } = self.state
        {
            let same_buffer = self.buffer.as_ref().is_some_and(|b| same_buffer(b, &buffer));
            if same_buffer && current_mode == mode && current_intensity == intensity {
                return Ok(());
            }
        }

        self.pending_mode = mode;

        if intensity == SubliminalIntensity::Off {
            if self.live_mode.take().is_some() {
                gains.send(EngineCommand::ReplaceSource {
                    layer: Layer::Subliminal,
                    source: None,
                    fade_frames: gains.frames(DEFAULT_RAMP_SECONDS),
                })?;
                gains.ramp_to(GainPath::Subliminal, 0.0, DEFAULT_RAMP_SECONDS)?;
            }
        } else {
            self.launch(gains, &buffer, mode, intensity)?;
        }

        self.buffer = Some(buffer);
        self.state = SubliminalState::Playing { mode, intensity };
        log::info!("Subliminal started: {} / {}", mode, intensity);
        Ok(())
    }

    /// Change the gain without touching the source's shaping
    pub fn update_intensity(
        &mut self,
        gains: &mut GainAutomation,
        intensity: SubliminalIntensity,
    ) -> Result<(), EngineError> {
        self.ensure_alive()?;

        let SubliminalState::Playing { mode, intensity: current } = self.state else {
            log::debug!("Subliminal idle; intensity change ignored");
            return Ok(());
        };
        if current == intensity {
            return Ok(());
        }

        if intensity == SubliminalIntensity::Off {
            gains.ramp_to(GainPath::Subliminal, 0.0, DEFAULT_RAMP_SECONDS)?;
        } else if self.live_mode == Some(mode) {
            gains.ramp_to(GainPath::Subliminal, resolve_gain(intensity), DEFAULT_RAMP_SECONDS)?;
        } else if let Some(buffer) = self.buffer.clone() {
            // First audible intensity, or the mode changed while silent
            self.launch(gains, &buffer, mode, intensity)?;
        }

        self.state = SubliminalState::Playing { mode, intensity };
        log::debug!("Subliminal intensity -> {}", intensity);
        Ok(())
    }

    /// Change the shaping
    ///
    /// Audible playback restarts with the new shaping at the same gain;
    /// at Off the mode is only recorded for the next start.
    pub fn update_mode(
        &mut self,
        gains: &mut GainAutomation,
        mode: SubliminalMode,
    ) -> Result<(), EngineError> {
        self.ensure_alive()?;
        self.pending_mode = mode;

        let SubliminalState::Playing { mode: current, intensity } = self.state else {
            return Ok(());
        };
        if current == mode {
            return Ok(());
        }

        if intensity != SubliminalIntensity::Off {
            if let Some(buffer) = self.buffer.clone() {
                let source = self.build_source(&buffer, mode, gains.sample_rate());
                gains.send(EngineCommand::ReplaceSource {
                    layer: Layer::Subliminal,
                    source: Some(source),
                    fade_frames: gains.frames(RESTART_FADE_SECONDS),
                })?;
                self.live_mode = Some(mode);
            }
        }

        self.state = SubliminalState::Playing { mode, intensity };
        log::debug!("Subliminal mode -> {}", mode);
        Ok(())
    }

    /// Release the source and return to Idle
    ///
    /// Any ramp in flight on the subliminal path is cancelled.
    pub fn stop(&mut self, gains: &mut GainAutomation) -> Result<(), EngineError> {
        self.ensure_alive()?;
        if self.state == SubliminalState::Idle {
            return Ok(());
        }

        self.state = SubliminalState::Idle;
        self.buffer = None;
        if self.live_mode.take().is_some() {
            gains.send(EngineCommand::StopSource {
                layer: Layer::Subliminal,
            })?;
        }
        gains.set_immediate(GainPath::Subliminal, 0.0)?;
        log::info!("Subliminal stopped");
        Ok(())
    }

    /// Stop if playing and retire the controller for good
    ///
    /// Valid from any state; the controller is Destroyed even if the
    /// engine could not be told.
    pub fn destroy(&mut self, gains: &mut GainAutomation) -> Result<(), EngineError> {
        let result = match self.state {
            SubliminalState::Destroyed => return Ok(()),
            SubliminalState::Idle => Ok(()),
            SubliminalState::Playing { .. } => self.stop(gains),
        };
        self.state = SubliminalState::Destroyed;
        self.buffer = None;
        self.live_mode = None;
        result
    }
}

impl Default for SubliminalController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audio::{start_output, OfflineOutput, OutputConfig, OutputHandle, OutputLink};
    use crate::buffer::SampleBuffer;
    use crate::engine::EngineAtomics;

    struct Rig {
        gains: GainAutomation,
        output: OfflineOutput,
        atomics: Arc<EngineAtomics>,
        _handle: OutputHandle,
        controller: SubliminalController,
        voice: SharedBuffer,
    }

    impl Rig {
        fn new() -> Self {
            let OutputLink { handle, command_sender, atomics, sample_rate, .. } =
                start_output(&OutputConfig::offline()).unwrap();
            let samples: Vec<f32> = (0..48000).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
            Self {
                gains: GainAutomation::new(command_sender, sample_rate),
                output: handle.offline().unwrap().clone(),
                atomics,
                _handle: handle,
                controller: SubliminalController::new(),
                voice: SampleBuffer::from_interleaved(&samples, 1, 48000).into_shared(),
            }
        }

        fn start(&mut self, mode: SubliminalMode, intensity: SubliminalIntensity) -> Result<(), EngineError> {
            let voice = self.voice.clone();
            self.controller.start(&mut self.gains, voice, mode, intensity)
        }

        /// Render half a second (longer than any ramp)
        fn settle(&self) {
            self.output.render(24000).unwrap();
        }

        fn gain(&self) -> f32 {
            self.atomics.gain(GainPath::Subliminal)
        }
    }

    #[test]
    fn test_resolve_gain_monotonic() {
        assert_eq!(resolve_gain(SubliminalIntensity::Off), 0.0);
        let gains: Vec<f32> = SubliminalIntensity::ALL.iter().map(|&i| resolve_gain(i)).collect();
        assert!(gains.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(resolve_gain(SubliminalIntensity::High), 0.14);
    }

    #[test]
    fn test_mode_shaping() {
        assert_eq!(SubliminalMode::Echo.shaping(), Shaping { playback_rate: 1.0, detune_cents: -200.0 });
        assert_eq!(SubliminalMode::Rapid.shaping(), Shaping { playback_rate: 1.7, detune_cents: -100.0 });
        assert_eq!("RAPID".parse::<SubliminalMode>(), Ok(SubliminalMode::Rapid));
        assert_eq!("medium".parse::<SubliminalIntensity>(), Ok(SubliminalIntensity::Medium));
    }

    #[test]
    fn test_start_ramps_in_from_silence() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Medium).unwrap();

        rig.output.render(512).unwrap();
        assert!(rig.gain() > 0.0 && rig.gain() < 0.08);

        rig.settle();
        assert_eq!(rig.gain(), 0.08);
        assert!(rig.atomics.is_source_active(Layer::Subliminal));
        let expected = SubliminalMode::Echo.shaping().effective_rate();
        assert!((rig.atomics.source_rate(Layer::Subliminal) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_double_start_keeps_one_source() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Low).unwrap();
        rig.settle();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Low).unwrap();
        rig.settle();

        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 1);
        assert!(rig.atomics.is_source_active(Layer::Subliminal));
        assert_eq!(rig.gain(), 0.03);
    }

    #[test]
    fn test_mode_change_while_off_stays_silent() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Off).unwrap();
        rig.controller.update_mode(&mut rig.gains, SubliminalMode::Rapid).unwrap();
        rig.settle();

        assert_eq!(rig.gain(), 0.0);
        assert!(!rig.atomics.is_source_active(Layer::Subliminal));
        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 0);
        assert_eq!(rig.controller.pending_mode(), SubliminalMode::Rapid);

        // The recorded mode is used once the layer becomes audible
        rig.controller
            .update_intensity(&mut rig.gains, SubliminalIntensity::High)
            .unwrap();
        rig.settle();
        let expected = SubliminalMode::Rapid.shaping().effective_rate();
        assert!((rig.atomics.source_rate(Layer::Subliminal) - expected).abs() < 1e-12);
        assert_eq!(rig.gain(), 0.14);
    }

    #[test]
    fn test_mode_change_after_fading_out_stays_silent() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Low).unwrap();
        rig.settle();
        rig.controller
            .update_intensity(&mut rig.gains, SubliminalIntensity::Off)
            .unwrap();
        rig.settle();
        let echo_rate = rig.atomics.source_rate(Layer::Subliminal);

        rig.controller.update_mode(&mut rig.gains, SubliminalMode::Rapid).unwrap();
        rig.settle();

        assert_eq!(rig.gain(), 0.0);
        assert_eq!(rig.gains.target(GainPath::Subliminal), 0.0);
        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 1);
        assert_eq!(rig.atomics.source_rate(Layer::Subliminal), echo_rate);
        assert_eq!(
            rig.controller.state(),
            SubliminalState::Playing { mode: SubliminalMode::Rapid, intensity: SubliminalIntensity::Off }
        );

        // Raising the intensity again brings the new mode in
        rig.controller
            .update_intensity(&mut rig.gains, SubliminalIntensity::Medium)
            .unwrap();
        rig.settle();
        let expected = SubliminalMode::Rapid.shaping().effective_rate();
        assert!((rig.atomics.source_rate(Layer::Subliminal) - expected).abs() < 1e-12);
        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 2);
        assert_eq!(rig.gain(), 0.08);
    }

    #[test]
    fn test_intensity_never_touches_shaping() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Rapid, SubliminalIntensity::Low).unwrap();
        rig.settle();
        let rate = rig.atomics.source_rate(Layer::Subliminal);

        for intensity in [
            SubliminalIntensity::High,
            SubliminalIntensity::Off,
            SubliminalIntensity::Medium,
        ] {
            rig.controller.update_intensity(&mut rig.gains, intensity).unwrap();
            rig.settle();
            assert_eq!(rig.atomics.source_rate(Layer::Subliminal), rate);
            assert_eq!(rig.gain(), resolve_gain(intensity));
        }
        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 1);
        assert_eq!(
            rig.controller.state(),
            SubliminalState::Playing { mode: SubliminalMode::Rapid, intensity: SubliminalIntensity::Medium }
        );
    }

    #[test]
    fn test_mode_change_restarts_at_same_gain() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Medium).unwrap();
        rig.settle();
        rig.controller.update_mode(&mut rig.gains, SubliminalMode::Rapid).unwrap();
        rig.settle();

        assert_eq!(rig.atomics.sources_started(Layer::Subliminal), 2);
        let expected = SubliminalMode::Rapid.shaping().effective_rate();
        assert!((rig.atomics.source_rate(Layer::Subliminal) - expected).abs() < 1e-12);
        assert_eq!(rig.gain(), 0.08);
        assert_eq!(rig.gains.target(GainPath::Subliminal), 0.08);
    }

    #[test]
    fn test_stop_mid_ramp() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::High).unwrap();
        rig.output.render(1024).unwrap();
        rig.controller.stop(&mut rig.gains).unwrap();
        rig.settle();

        assert_eq!(rig.controller.state(), SubliminalState::Idle);
        assert!(!rig.atomics.is_source_active(Layer::Subliminal));
        assert_eq!(rig.gain(), 0.0);
        // The shared buffer is still usable by others
        assert_eq!(rig.voice.len(), 48000);
    }

    #[test]
    fn test_destroy_is_terminal() {
        let mut rig = Rig::new();
        rig.start(SubliminalMode::Echo, SubliminalIntensity::Low).unwrap();
        rig.controller.destroy(&mut rig.gains).unwrap();
        rig.settle();

        assert_eq!(rig.controller.state(), SubliminalState::Destroyed);
        assert!(!rig.atomics.is_source_active(Layer::Subliminal));
        assert_eq!(
            rig.start(SubliminalMode::Echo, SubliminalIntensity::Low),
            Err(EngineError::SubliminalDestroyed)
        );
        assert_eq!(
            rig.controller.update_mode(&mut rig.gains, SubliminalMode::Rapid),
            Err(EngineError::SubliminalDestroyed)
        );
        assert_eq!(rig.controller.stop(&mut rig.gains), Err(EngineError::SubliminalDestroyed));
        assert!(rig.controller.destroy(&mut rig.gains).is_ok());
    }
}
