//! Feature tiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription tier of the current user
///
/// Ordered: every tier includes what the tiers below it unlock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Elite,
}

impl Tier {
    /// Whether this tier unlocks content requiring `required`
    #[inline]
    pub fn satisfies(self, required: Tier) -> bool {
        self >= required
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Elite => "elite",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "elite" => Ok(Tier::Elite),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Source of truth for the user's tier (purchases live elsewhere)
pub trait TierOracle {
    fn current_tier(&self) -> Tier;
}

/// A fixed tier answers for itself
impl TierOracle for Tier {
    fn current_tier(&self) -> Tier {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Elite.satisfies(Tier::Pro));
        assert!(Tier::Pro.satisfies(Tier::Free));
        assert!(!Tier::Free.satisfies(Tier::Elite));
        assert!(!Tier::Pro.satisfies(Tier::Elite));
    }

    #[test]
    fn test_parse() {
        assert_eq!("ELITE".parse::<Tier>(), Ok(Tier::Elite));
        assert!("platinum".parse::<Tier>().is_err());
    }
}
