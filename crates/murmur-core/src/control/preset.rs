//! Mix presets
//!
//! A preset fixes the vocal level, the reverb send, how many times the
//! recording plays and the default background and frequency levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

/// Ramp used when switching presets on a running session
pub const PRESET_RAMP_SECONDS: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixPreset {
    pub vocal_volume: f32,
    /// Send level into the room reverb
    pub reverb_amount: f32,
    /// Total passes of the recording per session
    pub loop_count: u32,
    pub background_volume: f32,
    pub frequency_volume: f32,
}

impl MixPreset {
    pub const OPTIMAL: MixPreset = MixPreset {
        vocal_volume: 0.85,
        reverb_amount: 0.40,
        loop_count: 3,
        background_volume: 0.20,
        frequency_volume: 0.25,
    };

    pub const SLEEP: MixPreset = MixPreset {
        vocal_volume: 0.63,
        reverb_amount: 0.55,
        loop_count: 5,
        background_volume: 0.30,
        frequency_volume: 0.42,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetKind {
    #[default]
    Optimal,
    Sleep,
}

impl PresetKind {
    pub const ALL: [PresetKind; 2] = [PresetKind::Optimal, PresetKind::Sleep];

    pub fn preset(self) -> MixPreset {
        match self {
            PresetKind::Optimal => MixPreset::OPTIMAL,
            PresetKind::Sleep => MixPreset::SLEEP,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PresetKind::Optimal => "optimal",
            PresetKind::Sleep => "sleep",
        }
    }
}

impl fmt::Display for PresetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PresetKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimal" => Ok(PresetKind::Optimal),
            "sleep" => Ok(PresetKind::Sleep),
            _ => Err(EngineError::UnknownPreset(s.to_string())),
        }
    }
}

/// Look up a preset by name
pub fn resolve(name: &str) -> Result<MixPreset, EngineError> {
    name.parse::<PresetKind>().map(PresetKind::preset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known() {
        assert_eq!(resolve("optimal"), Ok(MixPreset::OPTIMAL));
        assert_eq!(resolve("Sleep"), Ok(MixPreset::SLEEP));
        assert_eq!(resolve("sleep").unwrap().loop_count, 5);
        assert_eq!(resolve("optimal").unwrap().vocal_volume, 0.85);
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(resolve("party"), Err(EngineError::UnknownPreset("party".into())));
        assert!(resolve("").is_err());
    }

    #[test]
    fn test_levels_in_range() {
        for kind in PresetKind::ALL {
            let p = kind.preset();
            for v in [p.vocal_volume, p.reverb_amount, p.background_volume, p.frequency_volume] {
                assert!((0.0..=1.0).contains(&v));
            }
            assert!(p.loop_count >= 1);
        }
    }
}
