//! Output errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no output devices available")]
    NoDevices,

    #[error("no default output device: {0}")]
    NoDefaultDevice(String),

    #[error("output device '{0}' not found")]
    DeviceNotFound(String),

    #[error("output configuration rejected: {0}")]
    ConfigError(String),

    #[error("could not build output stream: {0}")]
    StreamBuildError(String),

    #[error("could not start output stream: {0}")]
    StreamPlayError(String),

    /// The device was unplugged or revoked mid-session
    #[error("output device lost: {0}")]
    DeviceLost(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
