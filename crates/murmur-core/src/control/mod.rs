//! Control path: sessions and everything that steers them
//!
//! ```text
//! AudioGraphManager ──open──► PlaybackSession ──► GainAutomation ──► command queue
//!                                  │                    ▲
//!                                  └─ SubliminalController
//! ```
//!
//! Every control operation validates its input, queues commands and
//! returns; the change is heard from the next render block on.

mod automation;
mod error;
mod events;
mod manager;
mod preset;
mod session;
mod subliminal;

pub use automation::{GainAutomation, DEFAULT_RAMP_SECONDS};
pub use error::EngineError;
pub use events::{EventHandler, SessionEvent, SubscriptionId};
pub use manager::AudioGraphManager;
pub use preset::{resolve, MixPreset, PresetKind, PRESET_RAMP_SECONDS};
pub use session::{
    Channel, PlaybackSession, SessionAssets, SessionState, LAYER_SWAP_SECONDS, OPEN_FADE_SECONDS,
    PAUSE_FADE_SECONDS,
};
pub use subliminal::{
    resolve_gain, SubliminalController, SubliminalIntensity, SubliminalMode, SubliminalState,
    RESTART_FADE_SECONDS,
};
