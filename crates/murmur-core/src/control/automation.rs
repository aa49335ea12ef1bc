//! Gain automation unit
//!
//! The single gateway for gain changes and, with them, every command a
//! session sends to its engine. Values are validated here, converted to
//! frame counts at the engine's sample rate and queued for the next block.

use super::error::EngineError;
use crate::audio::CommandSender;
use crate::engine::EngineCommand;
use crate::types::{GainPath, NUM_GAIN_PATHS};

/// Default ramp for intensity and volume changes
pub const DEFAULT_RAMP_SECONDS: f64 = 0.3;

pub struct GainAutomation {
    sender: CommandSender,
    sample_rate: u32,
    /// Last value requested per path
    targets: [f32; NUM_GAIN_PATHS],
}

impl GainAutomation {
    /// Wrap a fresh engine's command sender
    ///
    /// Targets start where a new engine starts: layers and reverb send
    /// silent, master at unity.
    pub fn new(sender: CommandSender, sample_rate: u32) -> Self {
        let mut targets = [0.0; NUM_GAIN_PATHS];
        targets[GainPath::Master.index()] = 1.0;
        Self {
            sender,
            sample_rate,
            targets,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The value a path is at or heading to
    #[inline]
    pub fn target(&self, path: GainPath) -> f32 {
        self.targets[path.index()]
    }

    /// Convert a duration to frames at the engine rate
    pub fn frames(&self, seconds: f64) -> u32 {
        (seconds * self.sample_rate as f64).round() as u32
    }

    fn validate(path: GainPath, value: f32) -> Result<(), EngineError> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(EngineError::InvalidGain { path, value })
        }
    }

    /// Jump a path to `value` at the next block
    ///
    /// Only for paths that are truly silent (nothing playing through them).
    pub fn set_immediate(&mut self, path: GainPath, value: f32) -> Result<(), EngineError> {
        Self::validate(path, value)?;
        self.send(EngineCommand::SetGain { path, value })?;
        self.targets[path.index()] = value;
        Ok(())
    }

    /// Ramp a path from wherever it is to `value` over `duration_seconds`
    ///
    /// Re-issuing the same target while the ramp runs leaves it in place.
    pub fn ramp_to(
        &mut self,
        path: GainPath,
        value: f32,
        duration_seconds: f64,
    ) -> Result<(), EngineError> {
        Self::validate(path, value)?;
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(EngineError::InvalidDuration(duration_seconds));
        }

        let frames = self.frames(duration_seconds);
        self.send(EngineCommand::RampGain {
            path,
            target: value,
            frames,
        })?;
        self.targets[path.index()] = value;
        log::debug!("Ramp {} -> {:.3} over {:.2}s", path, value, duration_seconds);
        Ok(())
    }

    /// Queue a topology command (sources, pause, shutdown)
    pub(crate) fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.sender.send(cmd).map_err(|_| {
            log::warn!("Engine command queue full; command dropped");
            EngineError::CommandQueueFull
        })
    }

    /// Forget targets after the engine halts
    pub(crate) fn reset_targets(&mut self) {
        self.targets = [0.0; NUM_GAIN_PATHS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audio::{start_output, OfflineOutput, OutputConfig, OutputHandle, OutputLink};
    use crate::engine::EngineAtomics;

    struct Rig {
        gains: GainAutomation,
        output: OfflineOutput,
        atomics: Arc<EngineAtomics>,
        _handle: OutputHandle,
    }

    fn automation() -> Rig {
        let link = start_output(&OutputConfig::offline()).unwrap();
        let OutputLink { handle, command_sender, atomics, sample_rate, .. } = link;
        Rig {
            gains: GainAutomation::new(command_sender, sample_rate),
            output: handle.offline().unwrap().clone(),
            atomics,
            _handle: handle,
        }
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut gains = automation().gains;
        for bad in [-0.1, 1.01, f32::NAN, f32::INFINITY] {
            let err = gains.set_immediate(GainPath::Vocal, bad).unwrap_err();
            assert!(matches!(err, EngineError::InvalidGain { path: GainPath::Vocal, .. }));
            assert!(gains.ramp_to(GainPath::Vocal, bad, 0.3).is_err());
        }
        // Nothing was recorded
        assert_eq!(gains.target(GainPath::Vocal), 0.0);
    }

    #[test]
    fn test_rejects_bad_duration() {
        let mut gains = automation().gains;
        assert_eq!(
            gains.ramp_to(GainPath::Vocal, 0.5, -1.0),
            Err(EngineError::InvalidDuration(-1.0))
        );
        assert!(gains.ramp_to(GainPath::Vocal, 0.5, f64::NAN).is_err());
    }

    #[test]
    fn test_ramp_runs_on_the_engine() {
        let Rig { mut gains, output, atomics, _handle } = automation();

        gains.ramp_to(GainPath::Background, 0.2, 0.1).unwrap();
        assert_eq!(gains.target(GainPath::Background), 0.2);

        output.render(2400).unwrap();
        let halfway = atomics.gain(GainPath::Background);
        assert!(halfway > 0.05 && halfway < 0.15, "halfway gain {}", halfway);

        output.render(4800).unwrap();
        assert_eq!(atomics.gain(GainPath::Background), 0.2);
    }

    #[test]
    fn test_frames_at_rate() {
        let gains = automation().gains;
        assert_eq!(gains.frames(0.3), 14400);
        assert_eq!(gains.frames(0.0), 0);
    }
}
