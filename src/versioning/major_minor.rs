//! `major.minor` versioning.
//!
//! Versions are pairs of unsigned integers compared numerically, so
//! `1.10` sorts after `1.2`. A bare major (`"2"`) is accepted in asset
//! references and stands for the latest minor of that major.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{UpdatePlan, VersioningPolicy};
use crate::error::AssetError;

/// A complete `major.minor` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Next minor of the same major.
    pub fn next_minor(&self) -> Result<Self, AssetError> {
        match self.minor.checked_add(1) {
            Some(minor) => Ok(Self::new(self.major, minor)),
            None => Err(AssetError::invalid(format!("no minor version after `{}`", self))),
        }
    }

    /// First minor of the next major.
    pub fn next_major(&self) -> Result<Self, AssetError> {
        match self.major.checked_add(1) {
            Some(major) => Ok(Self::new(major, 0)),
            None => Err(AssetError::invalid(format!("no major version after `{}`", self))),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_parts(s) {
            Some((major, Some(minor))) => Ok(Version::new(major, minor)),
            _ => Err(AssetError::invalid(format!(
                "`{}` is not a valid major.minor version",
                s
            ))),
        }
    }
}

/// Parse `M` or `M.m`. Each part is `0` or digits without a leading zero,
/// so every accepted token is the canonical spelling of its version.
fn parse_parts(s: &str) -> Option<(u64, Option<u64>)> {
    fn number(part: &str) -> Option<u64> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if part.len() > 1 && part.starts_with('0') {
            return None;
        }
        part.parse().ok()
    }

    match s.split_once('.') {
        Some((major, minor)) => Some((number(major)?, Some(number(minor)?))),
        None => Some((number(s)?, None)),
    }
}

/// The `major.minor` policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorMinorPolicy;

impl MajorMinorPolicy {
    fn parse_all(existing: &[String]) -> Result<Vec<Version>, AssetError> {
        existing.iter().map(|v| v.parse()).collect()
    }

    fn describe(existing: &[Version]) -> String {
        let majors: BTreeSet<u64> = existing.iter().map(|v| v.major).collect();
        let mut lines = vec![format!(
            "Found a total of {} versions ({} major versions)",
            existing.len(),
            majors.len()
        )];
        for major in majors {
            let mut minors: Vec<u64> = existing
                .iter()
                .filter(|v| v.major == major)
                .map(|v| v.minor)
                .collect();
            minors.sort_unstable();
            let minors: Vec<String> = minors.iter().map(|m| m.to_string()).collect();
            lines.push(format!(" - major `{}` = minor {}", major, minors.join(", ")));
        }
        lines.join("\n")
    }
}

impl VersioningPolicy for MajorMinorPolicy {
    fn name(&self) -> &'static str {
        "major.minor"
    }

    fn initial_version(&self) -> String {
        Version::new(0, 0).to_string()
    }

    fn is_valid(&self, version: &str) -> bool {
        matches!(parse_parts(version), Some((_, Some(_))))
    }

    fn is_valid_reference(&self, version: &str) -> bool {
        parse_parts(version).is_some()
    }

    fn compare(&self, a: &str, b: &str) -> Result<Ordering, AssetError> {
        let a: Version = a.parse()?;
        let b: Version = b.parse()?;
        Ok(a.cmp(&b))
    }

    fn latest(
        &self,
        requested: Option<&str>,
        existing: &[String],
    ) -> Result<Option<String>, AssetError> {
        let versions = Self::parse_all(existing)?;
        let found = match requested {
            None => versions.into_iter().max(),
            Some(req) => match parse_parts(req) {
                Some((major, None)) => versions.into_iter().filter(|v| v.major == major).max(),
                Some((major, Some(minor))) => {
                    let wanted = Version::new(major, minor);
                    versions.into_iter().find(|v| *v == wanted)
                }
                None => {
                    return Err(AssetError::invalid(format!(
                        "`{}` is not a valid major.minor version",
                        req
                    )))
                }
            },
        };
        Ok(found.map(|v| v.to_string()))
    }

    fn plan_update(
        &self,
        requested: Option<&str>,
        existing: &[String],
        bump_major: bool,
    ) -> Result<UpdatePlan, AssetError> {
        let versions = Self::parse_all(existing)?;
        let mut description = Self::describe(&versions);

        let new_version = match requested {
            None => {
                let latest = versions.iter().max().copied().ok_or_else(|| {
                    AssetError::not_found("", "no existing version to update")
                })?;
                if bump_major {
                    description.push_str(&format!(
                        "\nBumping major version of latest `{}`",
                        latest
                    ));
                    latest.next_major()?
                } else {
                    description.push_str(&format!(
                        "\nBumping minor version of latest `{}`",
                        latest
                    ));
                    latest.next_minor()?
                }
            }
            Some(req) => {
                if bump_major {
                    return Err(AssetError::invalid(
                        "cannot bump the major version when a version is specified",
                    ));
                }
                match parse_parts(req) {
                    Some((major, None)) => {
                        let latest = versions
                            .iter()
                            .filter(|v| v.major == major)
                            .max()
                            .copied()
                            .ok_or_else(|| {
                                AssetError::invalid(format!(
                                    "no existing version with major `{}`",
                                    major
                                ))
                            })?;
                        description.push_str(&format!(
                            "\nBumping minor version of `{}`",
                            latest
                        ));
                        latest.next_minor()?
                    }
                    Some((major, Some(minor))) => {
                        let version = Version::new(major, minor);
                        description.push_str(&format!("\nPushing version `{}`", version));
                        version
                    }
                    None => {
                        return Err(AssetError::invalid(format!(
                            "`{}` is not a valid major.minor version",
                            req
                        )))
                    }
                }
            }
        };

        Ok(UpdatePlan {
            new_version: new_version.to_string(),
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse() {
        assert_eq!("1.10".parse::<Version>().unwrap(), Version::new(1, 10));
        assert!("1".parse::<Version>().is_err());
        assert!("1.".parse::<Version>().is_err());
        assert!(".1".parse::<Version>().is_err());
        assert!("1.2.3".parse::<Version>().is_err());
        assert!("a.b".parse::<Version>().is_err());
        assert!("+1.2".parse::<Version>().is_err());
    }

    #[test]
    fn test_non_canonical_rejected() {
        let policy = MajorMinorPolicy;
        for bad in ["1.02", "01.2", "00.0", "1.00"] {
            assert!(!policy.is_valid(bad), "accepted `{}`", bad);
            assert!(bad.parse::<Version>().is_err());
        }
        assert!(!policy.is_valid_reference("01"));
        assert!(policy.is_valid("0.0"));
        assert!(policy.is_valid("10.20"));
    }

    #[test]
    fn test_bump_overflow_is_an_error() {
        let policy = MajorMinorPolicy;
        let top_minor = format!("1.{}", u64::MAX);
        let top_major = format!("{}.3", u64::MAX);

        for (requested, existing, bump_major) in [
            (None, &top_minor, false),
            (None, &top_major, true),
            (Some("1"), &top_minor, false),
        ] {
            let err = policy
                .plan_update(requested, &v(&[existing.as_str()]), bump_major)
                .unwrap_err();
            assert!(matches!(err, AssetError::InvalidReference(_)), "{err}");
        }

        assert!(!policy.is_valid("1.18446744073709551616"));
    }

    #[test]
    fn test_numeric_compare() {
        let policy = MajorMinorPolicy;
        assert_eq!(policy.compare("1.2", "1.10").unwrap(), Ordering::Less);
        assert_eq!(policy.compare("2.0", "1.99").unwrap(), Ordering::Greater);
        assert_eq!(policy.compare("3.4", "3.4").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_sort_is_numeric() {
        let policy = MajorMinorPolicy;
        let sorted = policy.sort(&v(&["1.10", "0.3", "1.2", "10.0", "2.0"])).unwrap();
        assert_eq!(sorted, v(&["0.3", "1.2", "1.10", "2.0", "10.0"]));
    }

    #[test]
    fn test_initial_version() {
        assert_eq!(MajorMinorPolicy.initial_version(), "0.0");
    }

    #[test]
    fn test_plan_update_from_latest() {
        let policy = MajorMinorPolicy;
        let existing = v(&["2.5", "1.9", "2.1"]);

        let major = policy.plan_update(None, &existing, true).unwrap();
        assert_eq!(major.new_version, "3.0");

        let minor = policy.plan_update(None, &existing, false).unwrap();
        assert_eq!(minor.new_version, "2.6");
        assert!(minor.description.contains("3 versions"));
        assert!(minor.description.contains("2 major versions"));
    }

    #[test]
    fn test_plan_update_partial_major() {
        let policy = MajorMinorPolicy;
        let existing = v(&["2.5", "1.9", "1.10"]);
        let plan = policy.plan_update(Some("1"), &existing, false).unwrap();
        assert_eq!(plan.new_version, "1.11");

        assert!(policy.plan_update(Some("7"), &existing, false).is_err());
        assert!(policy.plan_update(Some("1"), &existing, true).is_err());
    }

    #[test]
    fn test_plan_update_full_version() {
        let policy = MajorMinorPolicy;
        let plan = policy.plan_update(Some("2.5"), &v(&["2.5"]), false).unwrap();
        assert_eq!(plan.new_version, "2.5");
    }

    #[test]
    fn test_plan_update_without_versions() {
        let err = MajorMinorPolicy.plan_update(None, &[], false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_latest() {
        let policy = MajorMinorPolicy;
        let existing = v(&["0.1", "1.2", "1.10", "0.9"]);
        assert_eq!(policy.latest(None, &existing).unwrap().as_deref(), Some("1.10"));
        assert_eq!(policy.latest(Some("0"), &existing).unwrap().as_deref(), Some("0.9"));
        assert_eq!(policy.latest(Some("1.2"), &existing).unwrap().as_deref(), Some("1.2"));
        assert_eq!(policy.latest(Some("1.3"), &existing).unwrap(), None);
        assert_eq!(policy.latest(Some("5"), &existing).unwrap(), None);
        assert_eq!(policy.latest(None, &[]).unwrap(), None);
    }

    #[test]
    fn test_reference_validity() {
        let policy = MajorMinorPolicy;
        assert!(policy.is_valid("0.1"));
        assert!(!policy.is_valid("0"));
        assert!(policy.is_valid_reference("0"));
        assert!(!policy.is_valid_reference("v1"));
    }
}
