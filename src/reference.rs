//! Asset references: `name[:version]`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::AssetError;
use crate::versioning::{VersioningPolicy, VersioningSystem};

/// One name segment: alphanumeric at both ends, `_`, `-`, `.` inside.
const NAME_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9_.\-]*[A-Za-z0-9])?(/[A-Za-z0-9]([A-Za-z0-9_.\-]*[A-Za-z0-9])?)*$";

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NAME_PATTERN).expect("asset name pattern is valid"))
}

/// A parsed asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetSpec {
    /// Asset name; may contain `/`-separated namespace segments.
    pub name: String,
    /// Requested version, complete (`1.2`) or partial (`1`).
    pub version: Option<String>,
}

impl AssetSpec {
    /// Build a spec, validating both parts under the default versioning system.
    pub fn new(name: impl Into<String>, version: Option<String>) -> Result<Self, AssetError> {
        let spec = Self {
            name: name.into(),
            version,
        };
        spec.validate(VersioningSystem::default().policy())?;
        Ok(spec)
    }

    /// Parse `name[:version]` under the default versioning system.
    pub fn parse(reference: &str) -> Result<Self, AssetError> {
        Self::parse_with(reference, VersioningSystem::default().policy())
    }

    /// Parse `name[:version]`, checking the version against `policy`.
    pub fn parse_with(reference: &str, policy: &dyn VersioningPolicy) -> Result<Self, AssetError> {
        let reference = reference.trim();
        let (name, version) = match reference.rsplit_once(':') {
            Some((name, version)) => (name, Some(version.to_string())),
            None => (reference, None),
        };
        let spec = Self {
            name: name.to_string(),
            version,
        };
        spec.validate(policy)?;
        Ok(spec)
    }

    /// Whether the version pins one exact version under `policy`.
    pub fn is_pinned(&self, policy: &dyn VersioningPolicy) -> bool {
        self.version.as_deref().is_some_and(|v| policy.is_valid(v))
    }

    fn validate(&self, policy: &dyn VersioningPolicy) -> Result<(), AssetError> {
        validate_name(&self.name)?;
        if let Some(version) = &self.version {
            if !policy.is_valid_reference(version) {
                return Err(AssetError::invalid(format!(
                    "`{}` is not a valid {} version for asset `{}`",
                    version,
                    policy.name(),
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Check an asset name against the name grammar.
///
/// Names share the key space with versions (`{env}/{name}/{version}/...`)
/// and manifests (`{env}/.meta/{name}/{version}.meta`), so no segment may
/// look like a version or end in `.meta`.
pub fn validate_name(name: &str) -> Result<(), AssetError> {
    if !name_regex().is_match(name) {
        return Err(AssetError::invalid(format!("`{}` is not a valid asset name", name)));
    }
    if let Some(segment) = name
        .split('/')
        .find(|s| is_version_like(s) || s.ends_with(".meta"))
    {
        return Err(AssetError::invalid(format!(
            "`{}` is not a valid asset name: segment `{}` collides with version or manifest keys",
            name, segment
        )));
    }
    Ok(())
}

/// Digits and dots only, e.g. `1`, `1.0`, `2.10.3`.
fn is_version_like(segment: &str) -> bool {
    segment.starts_with(|c: char| c.is_ascii_digit())
        && segment.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

impl FromStr for AssetSpec {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AssetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}
