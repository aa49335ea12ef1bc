//! Audio output for Murmur
//!
//! One real-time render path owns the mix engine: either a cpal device
//! callback or the offline renderer. The control path talks to it only
//! through the lock-free command queue and reads back atomics and events.
//!
//! ```ignore
//! use murmur_core::audio::{start_output, OutputConfig};
//!
//! let mut link = start_output(&OutputConfig::default())?;
//! link.command_sender.send(EngineCommand::SetGain { path: GainPath::Master, value: 1.0 })?;
//! let gain = link.atomics.gain(GainPath::Master);
//! ```

mod backend;
mod config;
mod cpal_backend;
mod device;
mod error;
mod offline_backend;

pub use backend::{start_output, CommandSender, OutputHandle, OutputHealth, OutputLink};
pub use config::{
    BufferSize, DeviceId, OutputBackend, OutputConfig, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
};
pub use cpal_backend::CpalOutputHandle;
pub use device::{get_output_devices, OutputDevice};
pub use error::{AudioError, AudioResult};
pub use offline_backend::OfflineOutput;
