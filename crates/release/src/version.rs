//! npm-compatible version increments.
//!
//! [`semver::Version`] parses and orders versions but has no notion of
//! incrementing one. The rules here follow npm's `semver.inc`: a major bump
//! of `2.0.0-beta.1` releases `2.0.0`, `prerelease` increments the last
//! numeric identifier, and build metadata never survives an increment.

use crate::change::ChangeType;
use crate::error::{Error, Result};
use semver::{BuildMetadata, Prerelease, Version};
use std::fmt;

/// An increment to apply to a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseType {
    /// `X.0.0`
    Major,
    /// `x.Y.0`
    Minor,
    /// `x.y.Z`
    Patch,
    /// `X.0.0-0`
    Premajor,
    /// `x.Y.0-0`
    Preminor,
    /// `x.y.Z-0`
    Prepatch,
    /// Next prerelease of the current version, or `x.y.Z-0`.
    Prerelease,
}

impl ReleaseType {
    /// The increment a change type applies, if any.
    ///
    /// Hotfixes are prerelease increments; `none` and `dependency` changes
    /// do not move the version on their own.
    #[must_use]
    pub const fn for_change(change_type: ChangeType) -> Option<Self> {
        match change_type {
            ChangeType::Major => Some(Self::Major),
            ChangeType::Minor => Some(Self::Minor),
            ChangeType::Patch => Some(Self::Patch),
            ChangeType::Hotfix => Some(Self::Prerelease),
            ChangeType::Dependency | ChangeType::None => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Premajor => "premajor",
            Self::Preminor => "preminor",
            Self::Prepatch => "prepatch",
            Self::Prerelease => "prerelease",
        }
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies `release` to `version`.
///
/// `identifier` names the prerelease channel for the `pre*` increments,
/// e.g. `beta` turns `1.0.0` into `1.0.1-beta.0` under `Prerelease`.
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] if the identifier cannot form a valid
/// prerelease.
pub fn increment(
    version: &Version,
    release: ReleaseType,
    identifier: Option<&str>,
) -> Result<Version> {
    let mut next = version.clone();
    next.build = BuildMetadata::EMPTY;
    let had_pre = !next.pre.is_empty();

    match release {
        ReleaseType::Major => {
            if next.minor != 0 || next.patch != 0 || !had_pre {
                next.major += 1;
            }
            next.minor = 0;
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Minor => {
            if next.patch != 0 || !had_pre {
                next.minor += 1;
            }
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Patch => {
            if !had_pre {
                next.patch += 1;
            }
            next.pre = Prerelease::EMPTY;
        }
        ReleaseType::Premajor => {
            next.major += 1;
            next.minor = 0;
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
            bump_prerelease(&mut next, identifier)?;
        }
        ReleaseType::Preminor => {
            next.minor += 1;
            next.patch = 0;
            next.pre = Prerelease::EMPTY;
            bump_prerelease(&mut next, identifier)?;
        }
        ReleaseType::Prepatch => {
            next.patch += 1;
            next.pre = Prerelease::EMPTY;
            bump_prerelease(&mut next, identifier)?;
        }
        ReleaseType::Prerelease => {
            if !had_pre {
                next.patch += 1;
            }
            bump_prerelease(&mut next, identifier)?;
        }
    }

    Ok(next)
}

fn bump_prerelease(version: &mut Version, identifier: Option<&str>) -> Result<()> {
    let mut parts: Vec<String> = if version.pre.is_empty() {
        vec!["0".to_string()]
    } else {
        let mut parts: Vec<String> = version.pre.split('.').map(str::to_string).collect();
        match parts.iter().rposition(|part| part.parse::<u64>().is_ok()) {
            Some(idx) => {
                let n: u64 = parts[idx].parse().unwrap_or_default();
                parts[idx] = (n + 1).to_string();
            }
            None => parts.push("0".to_string()),
        }
        parts
    };

    if let Some(id) = identifier.filter(|id| !id.is_empty()) {
        let same_channel = parts.first().is_some_and(|first| first == id)
            && parts.get(1).is_some_and(|n| n.parse::<u64>().is_ok());
        if !same_channel {
            parts = vec![id.to_string(), "0".to_string()];
        }
    }

    let text = parts.join(".");
    version.pre = Prerelease::new(&text).map_err(|_| Error::invalid_version(text))?;
    Ok(())
}

/// The range `>=version <nextMajor` used for range-style dependencies.
///
/// For a prerelease the upper bound is the major after its release, so
/// `2.0.0-beta.1` yields `>=2.0.0-beta.1 <3.0.0`.
#[must_use]
pub fn new_range_dependency(version: &Version) -> String {
    let mut upper = strip_build(version);
    upper.pre = Prerelease::EMPTY;
    upper.major += 1;
    upper.minor = 0;
    upper.patch = 0;
    format!(">={version} <{upper}")
}

/// Copy of `version` without build metadata.
#[must_use]
pub fn strip_build(version: &Version) -> Version {
    let mut stripped = version.clone();
    stripped.build = BuildMetadata::EMPTY;
    stripped
}

/// Whether `version` carries prerelease identifiers.
#[must_use]
pub fn is_prerelease(version: &Version) -> bool {
    !version.pre.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn inc(s: &str, release: ReleaseType) -> String {
        increment(&v(s), release, None).unwrap().to_string()
    }

    #[test]
    fn test_release_increments() {
        assert_eq!(inc("1.2.3", ReleaseType::Major), "2.0.0");
        assert_eq!(inc("1.2.3", ReleaseType::Minor), "1.3.0");
        assert_eq!(inc("1.2.3", ReleaseType::Patch), "1.2.4");
        assert_eq!(inc("1.2.3+build.5", ReleaseType::Patch), "1.2.4");
    }

    #[test]
    fn test_release_of_prerelease() {
        assert_eq!(inc("2.0.0-beta.1", ReleaseType::Major), "2.0.0");
        assert_eq!(inc("2.1.0-beta.1", ReleaseType::Major), "3.0.0");
        assert_eq!(inc("1.3.0-rc.0", ReleaseType::Minor), "1.3.0");
        assert_eq!(inc("1.2.4-rc.0", ReleaseType::Patch), "1.2.4");
    }

    #[test]
    fn test_pre_increments() {
        assert_eq!(inc("1.2.3", ReleaseType::Premajor), "2.0.0-0");
        assert_eq!(inc("1.2.3", ReleaseType::Preminor), "1.3.0-0");
        assert_eq!(inc("1.2.3", ReleaseType::Prepatch), "1.2.4-0");
        assert_eq!(inc("1.2.3", ReleaseType::Prerelease), "1.2.4-0");
        assert_eq!(inc("1.2.4-0", ReleaseType::Prerelease), "1.2.4-1");
        assert_eq!(inc("1.2.4-beta.3", ReleaseType::Prerelease), "1.2.4-beta.4");
    }

    #[test]
    fn test_hotfix_identifier_gets_counter() {
        assert_eq!(inc("1.0.0-hotfix", ReleaseType::Prerelease), "1.0.0-hotfix.0");
        assert_eq!(inc("1.0.0-hotfix.0", ReleaseType::Prerelease), "1.0.0-hotfix.1");
    }

    #[test]
    fn test_named_prerelease_channel() {
        let beta = |s: &str| {
            increment(&v(s), ReleaseType::Prerelease, Some("beta"))
                .unwrap()
                .to_string()
        };
        assert_eq!(beta("1.0.0"), "1.0.1-beta.0");
        assert_eq!(beta("1.0.1-beta.0"), "1.0.1-beta.1");
        assert_eq!(beta("1.0.1-alpha.4"), "1.0.1-beta.0");
    }

    #[test]
    fn test_new_range_dependency() {
        assert_eq!(new_range_dependency(&v("1.2.0")), ">=1.2.0 <2.0.0");
        assert_eq!(
            new_range_dependency(&v("2.0.0-beta.1")),
            ">=2.0.0-beta.1 <3.0.0"
        );
    }

    #[test]
    fn test_change_type_mapping() {
        assert_eq!(
            ReleaseType::for_change(ChangeType::Hotfix),
            Some(ReleaseType::Prerelease)
        );
        assert_eq!(ReleaseType::for_change(ChangeType::Dependency), None);
    }
}
