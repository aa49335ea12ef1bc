//! Content catalog and tier gating
//!
//! Which frequencies and soundscapes exist, and which tier unlocks them.

pub mod frequency;
pub mod soundscape;
mod tier;

pub use frequency::{is_frequency_allowed, FrequencyInfo, DEFAULT_FREQUENCY};
pub use soundscape::{is_soundscape_allowed, SoundscapeInfo};
pub use tier::{Tier, TierOracle};
