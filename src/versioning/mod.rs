//! Version numbering policies.
//!
//! A [`VersioningPolicy`] owns the version grammar, the ordering and the
//! "what comes next" rules. Only the `major.minor` policy exists today;
//! [`VersioningSystem`] is the configuration-facing selector.

mod major_minor;

pub use major_minor::{MajorMinorPolicy, Version};

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::AssetError;

/// Result of planning the next push of an existing asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Version the push should target.
    pub new_version: String,
    /// Human-readable summary of what was found and what will happen.
    pub description: String,
}

/// Version grammar, ordering and increment rules.
pub trait VersioningPolicy {
    /// Identifier used in configuration.
    fn name(&self) -> &'static str;

    /// Version assigned to the first push of a new asset.
    fn initial_version(&self) -> String;

    /// Whether `version` is a complete version under this policy.
    fn is_valid(&self, version: &str) -> bool;

    /// Whether `version` is acceptable inside an asset reference
    /// (complete or partial).
    fn is_valid_reference(&self, version: &str) -> bool;

    /// Total order between two complete versions.
    fn compare(&self, a: &str, b: &str) -> Result<Ordering, AssetError>;

    /// Versions in ascending order.
    fn sort(&self, versions: &[String]) -> Result<Vec<String>, AssetError> {
        for v in versions {
            if !self.is_valid(v) {
                return Err(AssetError::invalid(format!(
                    "`{}` is not a valid {} version",
                    v,
                    self.name()
                )));
            }
        }
        let mut sorted = versions.to_vec();
        sorted.sort_by(|a, b| self.compare(a, b).unwrap_or(Ordering::Equal));
        Ok(sorted)
    }

    /// Highest existing version matching `requested` (which may be partial
    /// or absent). `None` when nothing matches.
    fn latest(
        &self,
        requested: Option<&str>,
        existing: &[String],
    ) -> Result<Option<String>, AssetError>;

    /// Decide the version of the next push.
    fn plan_update(
        &self,
        requested: Option<&str>,
        existing: &[String],
        bump_major: bool,
    ) -> Result<UpdatePlan, AssetError>;
}

/// Configured versioning system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersioningSystem {
    #[default]
    MajorMinor,
}

impl VersioningSystem {
    /// The policy implementing this system.
    pub fn policy(&self) -> &'static dyn VersioningPolicy {
        match self {
            VersioningSystem::MajorMinor => &MajorMinorPolicy,
        }
    }
}

impl FromStr for VersioningSystem {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major.minor" | "major_minor" | "major-minor" => Ok(VersioningSystem::MajorMinor),
            other => Err(AssetError::Config(format!(
                "unknown versioning system `{}` (expected `major.minor`)",
                other
            ))),
        }
    }
}

impl fmt::Display for VersioningSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.policy().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_from_str() {
        assert_eq!(
            "major.minor".parse::<VersioningSystem>().unwrap(),
            VersioningSystem::MajorMinor
        );
        assert_eq!(
            "major_minor".parse::<VersioningSystem>().unwrap(),
            VersioningSystem::MajorMinor
        );
        assert!("semver".parse::<VersioningSystem>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(VersioningSystem::MajorMinor.to_string(), "major.minor");
    }

    #[test]
    fn test_default_sort_rejects_garbage() {
        let policy = VersioningSystem::MajorMinor.policy();
        let err = policy
            .sort(&["1.0".to_string(), "latest".to_string()])
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidReference(_)));
    }
}
