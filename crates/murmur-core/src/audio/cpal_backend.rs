//! CPAL device output
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │   Control Path   │───push()───────────►│   Command Queue     │
//! │ (session, caller)│                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ Relaxed atomics, events                   ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  EngineAtomics   │◄────────────────────│  CPAL Audio Thread  │
//! │  Event Queue     │                     │  (owns MixEngine)   │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! A device that disappears while streaming is reported through the stream
//! error callback; the output is marked lost and never reopened here.

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{create_engine, OutputHandle, OutputHealth, OutputLink, RenderState};
use super::config::OutputConfig;
use super::device::{find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult};

/// Keeps the device stream alive; drop to stop audio
pub struct CpalOutputHandle {
    _stream: Stream,
    health: Arc<OutputHealth>,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalOutputHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn health(&self) -> &Arc<OutputHealth> {
        &self.health
    }
}

pub(crate) fn start_device_output(config: &OutputConfig) -> AudioResult<OutputLink> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_cpal_default_device()?,
    };
    log::info!(
        "Opening output '{}'",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string())
    );

    let stream_config = negotiate_stream_config(&device, config)?;
    let sample_rate = stream_config.sample_rate.0;
    let buffer_size = config.buffer_size.frames();
    log::info!(
        "Output stream: {}ch @ {}Hz, {} frame blocks ({:.1}ms)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate)
    );

    let (state, command_sender, events, atomics) = create_engine(sample_rate);
    let health = Arc::new(OutputHealth::new());
    let stream = open_stream(&device, &stream_config, state, Arc::clone(&health))?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    Ok(OutputLink {
        handle: OutputHandle::Device(CpalOutputHandle {
            _stream: stream,
            health,
            sample_rate,
            buffer_size,
        }),
        command_sender,
        events,
        atomics,
        sample_rate,
        buffer_size,
    })
}

/// Choose an f32 layout for the device
///
/// Stereo at the configured rate is preferred. Otherwise the first f32
/// layout is used at its highest rate.
fn negotiate_stream_config(device: &cpal::Device, config: &OutputConfig) -> AudioResult<StreamConfig> {
    let wanted = config.target_sample_rate();
    let layouts: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(|layout| layout.sample_format() == SampleFormat::F32)
        .collect();
    let covers = |layout: &cpal::SupportedStreamConfigRange| {
        layout.min_sample_rate().0 <= wanted && wanted <= layout.max_sample_rate().0
    };

    let layout = layouts
        .iter()
        .find(|layout| layout.channels() >= 2 && covers(layout))
        .or_else(|| layouts.first())
        .ok_or_else(|| AudioError::ConfigError("device offers no f32 output".to_string()))?;

    let rate = if covers(layout) {
        cpal::SampleRate(wanted)
    } else {
        log::warn!(
            "Output cannot run at {}Hz; using {}Hz",
            wanted,
            layout.max_sample_rate().0
        );
        layout.max_sample_rate()
    };

    Ok(StreamConfig {
        channels: layout.channels(),
        sample_rate: rate,
        buffer_size: CpalBufferSize::Fixed(config.buffer_size.frames()),
    })
}

fn open_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<RenderState>>,
    health: Arc<OutputHealth>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let block = crate::engine::MAX_BUFFER_SIZE * channels;

    let write = move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        for slice in out.chunks_mut(block) {
            let rendered = state.render_block(slice.len() / channels);
            for (frame, sample) in slice.chunks_mut(channels).zip(rendered) {
                frame.fill(0.0);
                frame[0] = sample.left;
                if let Some(right) = frame.get_mut(1) {
                    *right = sample.right;
                }
            }
        }
    };

    let on_error = move |err: cpal::StreamError| {
        if let cpal::StreamError::DeviceNotAvailable = err {
            log::error!("Output device disappeared");
            health.mark_lost("device not available");
        } else {
            log::error!("Output stream error: {}", err);
        }
    };

    device
        .build_output_stream(config, write, on_error, None)
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
