//! Frequency tone catalog

use super::tier::Tier;

/// Frequency selected when none is chosen or the chosen one is locked
pub const DEFAULT_FREQUENCY: &str = "417hz";

/// A selectable frequency tone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyInfo {
    pub id: &'static str,
    pub label: &'static str,
    pub hz: f64,
    /// Minimum tier that may select this frequency
    pub min_tier: Tier,
}

const fn free(id: &'static str, label: &'static str, hz: f64) -> FrequencyInfo {
    FrequencyInfo {
        id,
        label,
        hz,
        min_tier: Tier::Free,
    }
}

const fn elite(id: &'static str, label: &'static str, hz: f64) -> FrequencyInfo {
    FrequencyInfo {
        id,
        label,
        hz,
        min_tier: Tier::Elite,
    }
}

pub const FREQUENCIES: &[FrequencyInfo] = &[
    free("174hz", "Foundation", 174.0),
    free("285hz", "Restore", 285.0),
    free("396hz", "Release", 396.0),
    free("417hz", "Change", 417.0),
    free("432hz", "Calm", 432.0),
    free("528hz", "Renewal", 528.0),
    free("639hz", "Connection", 639.0),
    free("741hz", "Clarity", 741.0),
    free("852hz", "Intuition", 852.0),
    elite("963hz", "Crown", 963.0),
    elite("40hz", "Gamma Focus", 40.0),
    elite("7.83hz", "Schumann Resonance", 7.83),
];

pub fn lookup(id: &str) -> Option<&'static FrequencyInfo> {
    FREQUENCIES.iter().find(|f| f.id == id)
}

/// Whether `tier` may select frequency `id`
///
/// Only catalog entries carry restrictions; unknown ids are not gated here
/// (they simply have no tone to play).
pub fn is_frequency_allowed(id: &str, tier: Tier) -> bool {
    lookup(id).map_or(true, |info| tier.satisfies(info.min_tier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elite_only_set() {
        for id in ["963hz", "40hz", "7.83hz"] {
            assert!(!is_frequency_allowed(id, Tier::Free), "{id}");
            assert!(!is_frequency_allowed(id, Tier::Pro), "{id}");
            assert!(is_frequency_allowed(id, Tier::Elite), "{id}");
        }
        assert!(is_frequency_allowed(DEFAULT_FREQUENCY, Tier::Free));
    }

    #[test]
    fn test_ids_are_unique() {
        for (i, a) in FREQUENCIES.iter().enumerate() {
            assert!(FREQUENCIES[i + 1..].iter().all(|b| b.id != a.id));
        }
    }
}
