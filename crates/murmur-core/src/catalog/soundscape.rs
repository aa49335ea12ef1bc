//! Background soundscape catalog

use super::tier::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundscapeInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub min_tier: Tier,
}

pub const SOUNDSCAPES: &[SoundscapeInfo] = &[
    SoundscapeInfo { id: "rain", label: "Soft Rain", min_tier: Tier::Free },
    SoundscapeInfo { id: "ocean", label: "Ocean Waves", min_tier: Tier::Free },
    SoundscapeInfo { id: "forest", label: "Forest Morning", min_tier: Tier::Free },
    SoundscapeInfo { id: "fireplace", label: "Fireplace", min_tier: Tier::Free },
    SoundscapeInfo { id: "brown-noise", label: "Brown Noise", min_tier: Tier::Free },
];

pub fn lookup(id: &str) -> Option<&'static SoundscapeInfo> {
    SOUNDSCAPES.iter().find(|s| s.id == id)
}

pub fn is_soundscape_allowed(id: &str, tier: Tier) -> bool {
    lookup(id).map_or(true, |info| tier.satisfies(info.min_tier))
}
