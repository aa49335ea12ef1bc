//! Offline export of a full session to WAV
//!
//! Opens a session on the offline backend, renders until the recording has
//! played all of its passes plus a short tail for the reverb to ring out,
//! and writes 16-bit stereo PCM.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::audio::OutputConfig;
use crate::buffer::SharedBuffer;
use crate::catalog::TierOracle;
use crate::config::EnvironmentSettings;
use crate::control::{
    AudioGraphManager, PresetKind, SessionAssets, SessionEvent, SubliminalIntensity, SubliminalMode,
};
use crate::types::StereoBuffer;

/// Audio rendered between event checks
const RENDER_CHUNK_SECONDS: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub preset: PresetKind,
    pub settings: EnvironmentSettings,
    pub subliminal: Option<(SubliminalMode, SubliminalIntensity)>,
    pub sample_rate: u32,
    /// Rendered after the last vocal pass
    pub tail_seconds: f64,
    /// Hard stop for recordings that never finish
    pub max_seconds: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            preset: PresetKind::default(),
            settings: EnvironmentSettings::default(),
            subliminal: None,
            sample_rate: crate::types::SAMPLE_RATE,
            tail_seconds: 2.0,
            max_seconds: 30.0 * 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSummary {
    pub frames: usize,
    pub sample_rate: u32,
    pub vocal_loops: u32,
    pub peak: f32,
}

impl ExportSummary {
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Render a whole session offline
pub fn render_session(
    voice: SharedBuffer,
    soundscape: Option<SharedBuffer>,
    options: &ExportOptions,
    tier: &dyn TierOracle,
) -> Result<(StereoBuffer, ExportSummary)> {
    let config = OutputConfig::offline().with_sample_rate(options.sample_rate);
    let mut manager = AudioGraphManager::new(config).context("Failed to start decode service")?;

    let assets = SessionAssets {
        voice,
        soundscape,
        frequency: None,
    };
    let session = manager
        .open(options.preset, &options.settings, assets, tier)
        .context("Failed to open offline session")?;
    if let Some((mode, intensity)) = options.subliminal {
        session.start_subliminal(mode, intensity)?;
    }

    let Some(output) = session.offline() else {
        bail!("Offline session has no offline renderer");
    };

    let max_frames = (options.max_seconds * options.sample_rate as f64) as usize;
    let mut mix = StereoBuffer::default();
    let mut finished = false;
    while !finished && mix.len() < max_frames {
        let chunk = output.render_seconds(RENDER_CHUNK_SECONDS)?;
        mix.extend_from_slice(chunk.as_slice());
        finished = session
            .poll_events()?
            .iter()
            .any(|event| *event == SessionEvent::VocalFinished);
    }
    if finished {
        let tail = output.render_seconds(options.tail_seconds)?;
        mix.extend_from_slice(tail.as_slice());
    } else {
        log::warn!("Export stopped at {:.0}s before the recording finished", options.max_seconds);
    }

    let summary = ExportSummary {
        frames: mix.len(),
        sample_rate: options.sample_rate,
        vocal_loops: session.atomics().vocal_loops(),
        peak: mix.peak(),
    };
    manager.close(&session);
    Ok((mix, summary))
}

/// Render a whole session to a 16-bit stereo WAV file
pub fn render_to_wav(
    path: &Path,
    voice: SharedBuffer,
    soundscape: Option<SharedBuffer>,
    options: &ExportOptions,
    tier: &dyn TierOracle,
) -> Result<ExportSummary> {
    let (mix, summary) = render_session(voice, soundscape, options, tier)?;
    write_wav(path, &mix, summary.sample_rate)?;
    log::info!(
        "Exported {:.1}s ({} passes) to {:?}",
        summary.duration_seconds(),
        summary.vocal_loops,
        path
    );
    Ok(summary)
}

fn write_wav(path: &Path, mix: &StereoBuffer, sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory: {:?}", parent))?;
    }

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    for &sample in mix.as_interleaved() {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * 32767.0) as i16)
            .context("Failed to write WAV sample")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}
