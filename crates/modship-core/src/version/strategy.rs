//! Static update strategy table keyed by update type.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::classify::UpdateType;

/// Coarse risk classification used to order batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Gating requirements for one class of update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStrategy {
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub requires_compatibility_test: bool,
}

impl UpdateStrategy {
    pub const PATCH: Self = Self {
        risk_level: RiskLevel::Low,
        requires_approval: false,
        requires_compatibility_test: false,
    };

    pub const MINOR: Self = Self {
        risk_level: RiskLevel::Medium,
        requires_approval: true,
        requires_compatibility_test: false,
    };

    pub const MAJOR: Self = Self {
        risk_level: RiskLevel::High,
        requires_approval: true,
        requires_compatibility_test: true,
    };

    pub const fn for_update(update_type: UpdateType) -> Self {
        match update_type {
            UpdateType::Patch => Self::PATCH,
            UpdateType::Minor => Self::MINOR,
            UpdateType::Major => Self::MAJOR,
        }
    }

    /// True when every requirement of `other` is also required here.
    pub fn is_at_least_as_strict_as(&self, other: &UpdateStrategy) -> bool {
        self.risk_level >= other.risk_level
            && (self.requires_approval || !other.requires_approval)
            && (self.requires_compatibility_test || !other.requires_compatibility_test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictness_is_monotonic() {
        let patch = UpdateType::Patch.strategy();
        let minor = UpdateType::Minor.strategy();
        let major = UpdateType::Major.strategy();

        assert!(major.is_at_least_as_strict_as(&minor));
        assert!(minor.is_at_least_as_strict_as(&patch));
        assert!(!patch.is_at_least_as_strict_as(&minor));
    }

    #[test]
    fn table_matches_expected_requirements() {
        let patch = UpdateType::Patch.strategy();
        assert_eq!(patch.risk_level, RiskLevel::Low);
        assert!(!patch.requires_approval);
        assert!(!patch.requires_compatibility_test);

        let minor = UpdateType::Minor.strategy();
        assert_eq!(minor.risk_level, RiskLevel::Medium);
        assert!(minor.requires_approval);
        assert!(!minor.requires_compatibility_test);

        let major = UpdateType::Major.strategy();
        assert_eq!(major.risk_level, RiskLevel::High);
        assert!(major.requires_approval);
        assert!(major.requires_compatibility_test);
    }
}
