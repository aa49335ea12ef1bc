//! Output configuration
//!
//! Where the mix goes (a device via cpal, or an in-process offline renderer)
//! and the buffer/sample-rate preferences used to open it.

use serde::{Deserialize, Serialize};

/// Frames per block when nothing is configured
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Buffer size used in low-latency mode (frames)
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 256;

/// Smallest buffer size a fixed request is clamped to (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Rate requested from the device unless configured
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Which backend renders the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// A real output device through cpal
    #[default]
    Device,
    /// Rendered on demand by the caller (export, tests)
    Offline,
}

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick its default
    #[default]
    Default,
    /// A specific size in frames (clamped to supported bounds)
    Fixed(u32),
    /// A small, known-good size
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => {
                (*frames).clamp(MIN_BUFFER_SIZE, crate::engine::MAX_BUFFER_SIZE as u32)
            }
            BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZE,
        }
    }

    /// Latency in milliseconds at a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// A pinned output device
///
/// The same device name can appear under several hosts; `host` narrows the
/// match, and leaving it out takes the first host that has the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), host: None }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            host: Some(host.to_owned()),
            ..Self::new(name)
        }
    }

    pub fn display_label(&self) -> String {
        self.host
            .as_ref()
            .map_or_else(|| self.name.clone(), |host| format!("{} / {}", host, self.name))
    }
}

/// Configuration for the session output
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub backend: OutputBackend,

    /// Output device (None = system default); ignored offline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,

    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 48kHz)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl OutputConfig {
    /// Offline rendering at the default rate
    pub fn offline() -> Self {
        Self {
            backend: OutputBackend::Offline,
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}
