//! Offline output
//!
//! Renders the engine on demand instead of on a device clock. Rendering
//! walks through the request in blocks of the configured buffer size, so
//! commands land on the same block boundaries a device callback would give
//! them. Used for WAV export and for exercising sessions without hardware.

use std::sync::{Arc, Mutex, PoisonError};

use super::backend::{create_engine, OutputHandle, OutputHealth, OutputLink, RenderState};
use super::config::OutputConfig;
use super::error::{AudioError, AudioResult};
use crate::types::StereoBuffer;

/// Caller-driven renderer for one engine
///
/// Cheap to clone; clones drive the same engine.
#[derive(Clone)]
pub struct OfflineOutput {
    state: Arc<Mutex<RenderState>>,
    health: Arc<OutputHealth>,
    sample_rate: u32,
    block_size: u32,
}

impl OfflineOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn health(&self) -> &Arc<OutputHealth> {
        &self.health
    }

    /// Render the next `frames` frames of the mix
    ///
    /// Fails once the output has been revoked.
    pub fn render(&self, frames: usize) -> AudioResult<StereoBuffer> {
        if self.health.is_lost() {
            return Err(AudioError::DeviceLost(
                self.health.reason().unwrap_or_default(),
            ));
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = StereoBuffer::default();
        let mut remaining = frames;
        while remaining > 0 {
            let block = remaining.min(self.block_size as usize);
            out.extend_from_slice(state.render_block(block));
            remaining -= block;
        }
        Ok(out)
    }

    /// Render `seconds` worth of audio
    pub fn render_seconds(&self, seconds: f64) -> AudioResult<StereoBuffer> {
        self.render((seconds.max(0.0) * self.sample_rate as f64).round() as usize)
    }

    /// Simulate the device being revoked (unplugged, permission withdrawn)
    pub fn revoke(&self) {
        self.health.mark_lost("output revoked");
    }
}

pub(crate) fn start_offline_output(config: &OutputConfig) -> OutputLink {
    let sample_rate = config.target_sample_rate();
    let block_size = config.buffer_size.frames();

    let (state, command_sender, events, atomics) = create_engine(sample_rate);
    let output = OfflineOutput {
        state,
        health: Arc::new(OutputHealth::new()),
        sample_rate,
        block_size,
    };

    log::info!(
        "Offline output ready: {}Hz, {} frame blocks",
        sample_rate,
        block_size
    );

    OutputLink {
        handle: OutputHandle::Offline(output),
        command_sender,
        events,
        atomics,
        sample_rate,
        buffer_size: block_size,
    }
}
