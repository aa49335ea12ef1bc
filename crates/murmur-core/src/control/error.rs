//! Control-layer errors

use thiserror::Error;

use crate::buffer::DecodeError;
use crate::types::GainPath;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A gain outside [0, 1] or not finite; an upstream contract violation
    #[error("Invalid gain {value} for {path}")]
    InvalidGain { path: GainPath, value: f32 },

    #[error("Invalid ramp duration: {0}s")]
    InvalidDuration(f64),

    #[error("Unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Subliminal layer has been destroyed")]
    SubliminalDestroyed,

    #[error("Engine command queue is full")]
    CommandQueueFull,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl EngineError {
    /// Text suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            EngineError::Decode(_) => "We couldn't process that recording. Please try recording again.",
            EngineError::OutputUnavailable(_) => "Audio device unavailable. Check your output and try again.",
            EngineError::CommandQueueFull => "Playback is busy. Please try again.",
            EngineError::SessionClosed => "Playback has ended.",
            _ => "Something went wrong with playback.",
        }
    }

    /// Whether this error means a caller broke the API contract
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidGain { .. }
                | EngineError::InvalidDuration(_)
                | EngineError::UnknownPreset(_)
        )
    }
}

impl From<crate::audio::AudioError> for EngineError {
    fn from(err: crate::audio::AudioError) -> Self {
        EngineError::OutputUnavailable(err.to_string())
    }
}
