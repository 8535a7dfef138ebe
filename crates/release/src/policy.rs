//! Version policies.
//!
//! Policies are read from a JSON array:
//!
//! ```json
//! [
//!   {
//!     "policyName": "framework",
//!     "definitionName": "lockStepVersion",
//!     "version": "1.4.0",
//!     "nextBump": "minor",
//!     "mainProject": "@acme/framework"
//!   },
//!   {
//!     "policyName": "plugins",
//!     "definitionName": "individualVersion",
//!     "lockedMajor": 3,
//!     "dependencies": { "versionFormatForPublish": "exact" }
//!   }
//! ]
//! ```

use crate::DryRun;
use crate::error::{Error, Result};
use crate::version::{ReleaseType, increment, strip_build};
use cascade_workspace::{PackageManifest, Project, ProjectGraph};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Default version policies file, relative to the workspace root.
pub const DEFAULT_POLICIES_FILE: &str = "common/config/version-policies.json";

/// A version bump requested for a whole policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    /// No bump.
    None,
    /// Next prerelease.
    Prerelease,
    /// Patch bump.
    Patch,
    /// Minor bump into a prerelease.
    Preminor,
    /// Minor bump.
    Minor,
    /// Major bump.
    Major,
    /// Major bump into a prerelease.
    Premajor,
    /// Patch bump into a prerelease.
    Prepatch,
}

impl BumpType {
    /// The version increment for this bump, `None` for [`BumpType::None`].
    #[must_use]
    pub const fn release_type(self) -> Option<ReleaseType> {
        match self {
            Self::None => None,
            Self::Prerelease => Some(ReleaseType::Prerelease),
            Self::Patch => Some(ReleaseType::Patch),
            Self::Preminor => Some(ReleaseType::Preminor),
            Self::Minor => Some(ReleaseType::Minor),
            Self::Major => Some(ReleaseType::Major),
            Self::Premajor => Some(ReleaseType::Premajor),
            Self::Prepatch => Some(ReleaseType::Prepatch),
        }
    }

    /// Parses a bump type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "prerelease" => Some(Self::Prerelease),
            "patch" => Some(Self::Patch),
            "preminor" => Some(Self::Preminor),
            "minor" => Some(Self::Minor),
            "major" => Some(Self::Major),
            "premajor" => Some(Self::Premajor),
            "prepatch" => Some(Self::Prepatch),
            _ => None,
        }
    }
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.release_type() {
            Some(release) => write!(f, "{release}"),
            None => f.write_str("none"),
        }
    }
}

/// How local dependency ranges are written on commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitFormat {
    /// Keep the declared ranges.
    #[default]
    Original,
    /// Replace local dependency ranges with `*`.
    Wildcard,
}

/// How local dependency ranges are written for publishing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishFormat {
    /// Keep the declared ranges.
    #[default]
    Original,
    /// Pin local dependencies to their exact local version.
    Exact,
}

/// Per-policy dependency formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyPolicy {
    /// Format applied before committing.
    #[serde(default)]
    pub version_format_for_commit: CommitFormat,
    /// Format applied before publishing.
    #[serde(default)]
    pub version_format_for_publish: PublishFormat,
}

/// All member projects share one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStepPolicy {
    /// Policy name.
    pub policy_name: String,
    /// The shared version.
    pub version: Version,
    /// Bump applied by `version bump` when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_bump: Option<BumpType>,
    /// The member that hosts the policy's changelog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_project: Option<String>,
    /// Dependency formatting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyPolicy>,
}

impl LockStepPolicy {
    /// Creates a lockstep policy at `version`.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            policy_name: name.into(),
            version,
            next_bump: None,
            main_project: None,
            dependencies: None,
        }
    }

    /// Sets the next bump.
    #[must_use]
    pub const fn with_next_bump(mut self, bump: BumpType) -> Self {
        self.next_bump = Some(bump);
        self
    }

    /// Sets the main project.
    #[must_use]
    pub fn with_main_project(mut self, project: impl Into<String>) -> Self {
        self.main_project = Some(project.into());
        self
    }

    /// Moves a project's manifest to the policy version.
    ///
    /// Returns `None` if the project is already at the policy version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionAboveLock`] if the project is ahead of the
    /// policy and `force` is not set.
    pub fn ensure(&self, manifest: &PackageManifest, force: bool) -> Result<Option<PackageManifest>> {
        let current = parse_manifest_version(manifest)?;
        match strip_build(&current).cmp(&strip_build(&self.version)) {
            Ordering::Equal => Ok(None),
            Ordering::Greater if !force => Err(Error::VersionAboveLock {
                package: manifest.name.clone(),
                version: manifest.version.clone(),
                locked: self.version.to_string(),
            }),
            _ => {
                let mut updated = manifest.clone();
                updated.version = self.version.to_string();
                Ok(Some(updated))
            }
        }
    }

    /// Advances the shared version by `bump`, or by the policy's next bump.
    ///
    /// Does nothing when neither is set, letting change files drive versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the prerelease identifier is invalid.
    pub fn bump(&mut self, bump: Option<BumpType>, identifier: Option<&str>) -> Result<()> {
        let Some(release) = bump.or(self.next_bump).and_then(BumpType::release_type) else {
            return Ok(());
        };
        self.version = increment(&self.version, release, identifier)?;
        Ok(())
    }

    /// Replaces the shared version. Returns whether it changed.
    pub fn update(&mut self, version: Version) -> bool {
        if self.version == version {
            return false;
        }
        self.version = version;
        true
    }

    /// Checks that `version` is exactly the policy version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicyVersion`] on mismatch.
    pub fn validate(&self, version: &str, package: &str) -> Result<()> {
        let candidate = Version::parse(version).map_err(|_| Error::invalid_version(version))?;
        if strip_build(&candidate) == strip_build(&self.version) {
            Ok(())
        } else {
            Err(Error::InvalidPolicyVersion {
                version: version.to_string(),
                package: package.to_string(),
                policy: self.policy_name.clone(),
            })
        }
    }
}

/// Each member project versions independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualPolicy {
    /// Policy name.
    pub policy_name: String,
    /// Required major version of every member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_major: Option<u64>,
    /// Dependency formatting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyPolicy>,
}

impl IndividualPolicy {
    /// Creates an individual policy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            policy_name: name.into(),
            locked_major: None,
            dependencies: None,
        }
    }

    /// Sets the locked major version.
    #[must_use]
    pub const fn with_locked_major(mut self, major: u64) -> Self {
        self.locked_major = Some(major);
        self
    }

    /// Moves a project below the locked major up to `{major}.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionAboveLockedMajor`] if the project's major is
    /// above the lock.
    pub fn ensure(&self, manifest: &PackageManifest) -> Result<Option<PackageManifest>> {
        let Some(locked_major) = self.locked_major else {
            return Ok(None);
        };
        let current = parse_manifest_version(manifest)?;
        match current.major.cmp(&locked_major) {
            Ordering::Less => {
                let mut updated = manifest.clone();
                updated.version = format!("{locked_major}.0.0");
                Ok(Some(updated))
            }
            Ordering::Greater => Err(Error::VersionAboveLockedMajor {
                package: manifest.name.clone(),
                version: manifest.version.clone(),
                locked_major,
            }),
            Ordering::Equal => Ok(None),
        }
    }

    /// Checks that `version` has the locked major.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicyVersion`] on mismatch.
    pub fn validate(&self, version: &str, package: &str) -> Result<()> {
        let candidate = Version::parse(version).map_err(|_| Error::invalid_version(version))?;
        match self.locked_major {
            Some(major) if major != candidate.major => Err(Error::InvalidPolicyVersion {
                version: version.to_string(),
                package: package.to_string(),
                policy: self.policy_name.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// A named version policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "definitionName")]
pub enum VersionPolicy {
    /// `lockStepVersion`
    #[serde(rename = "lockStepVersion")]
    LockStep(LockStepPolicy),
    /// `individualVersion`
    #[serde(rename = "individualVersion")]
    Individual(IndividualPolicy),
}

impl VersionPolicy {
    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::LockStep(policy) => &policy.policy_name,
            Self::Individual(policy) => &policy.policy_name,
        }
    }

    /// Whether members share one version.
    #[must_use]
    pub const fn is_lockstep(&self) -> bool {
        matches!(self, Self::LockStep(_))
    }

    /// The lockstep policy, if this is one.
    #[must_use]
    pub const fn as_lockstep(&self) -> Option<&LockStepPolicy> {
        match self {
            Self::LockStep(policy) => Some(policy),
            Self::Individual(_) => None,
        }
    }

    /// Dependency formatting, defaulted when not configured.
    #[must_use]
    pub fn dependency_policy(&self) -> DependencyPolicy {
        match self {
            Self::LockStep(policy) => policy.dependencies,
            Self::Individual(policy) => policy.dependencies,
        }
        .unwrap_or_default()
    }

    /// Aligns a member's manifest with the policy.
    ///
    /// # Errors
    ///
    /// See [`LockStepPolicy::ensure`] and [`IndividualPolicy::ensure`].
    pub fn ensure(&self, manifest: &PackageManifest, force: bool) -> Result<Option<PackageManifest>> {
        match self {
            Self::LockStep(policy) => policy.ensure(manifest, force),
            Self::Individual(policy) => policy.ensure(manifest),
        }
    }

    /// Bumps the policy version. Individual policies ignore bumps.
    ///
    /// # Errors
    ///
    /// Returns an error if the prerelease identifier is invalid.
    pub fn bump(&mut self, bump: Option<BumpType>, identifier: Option<&str>) -> Result<()> {
        match self {
            Self::LockStep(policy) => policy.bump(bump, identifier),
            Self::Individual(_) => Ok(()),
        }
    }

    /// Checks a member version against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicyVersion`] if the version does not fit.
    pub fn validate(&self, version: &str, package: &str) -> Result<()> {
        match self {
            Self::LockStep(policy) => policy.validate(version, package),
            Self::Individual(policy) => policy.validate(version, package),
        }
    }
}

impl From<LockStepPolicy> for VersionPolicy {
    fn from(policy: LockStepPolicy) -> Self {
        Self::LockStep(policy)
    }
}

impl From<IndividualPolicy> for VersionPolicy {
    fn from(policy: IndividualPolicy) -> Self {
        Self::Individual(policy)
    }
}

/// All version policies of a workspace, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRegistry {
    policies: Vec<VersionPolicy>,
}

impl PolicyRegistry {
    /// Creates a registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two policies share a name.
    pub fn new(policies: impl IntoIterator<Item = VersionPolicy>) -> Result<Self> {
        let policies: Vec<VersionPolicy> = policies.into_iter().collect();
        let mut seen = BTreeSet::new();
        for policy in &policies {
            if !seen.insert(policy.name()) {
                return Err(Error::config(
                    format!("Duplicate version policy '{}'", policy.name()),
                    "Each policyName must be unique",
                ));
            }
        }
        Ok(Self { policies })
    }

    /// Loads policies from a JSON file. A missing file yields no policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No version policies file");
            return Ok(Self::default());
        }
        let policies: Vec<VersionPolicy> = cascade_workspace::read_json_file(path)?;
        debug!(path = %path.display(), count = policies.len(), "Loaded version policies");
        Self::new(policies)
    }

    /// Writes the policies back as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path, dry_run: DryRun) -> Result<()> {
        info!(mode = dry_run.label(), path = %path.display(), "Saving version policies");
        if dry_run.is_dry_run() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = serde_json::to_string_pretty(&self.policies)?;
        content.push('\n');
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Iterates over the policies in file order.
    pub fn policies(&self) -> impl Iterator<Item = &VersionPolicy> {
        self.policies.iter()
    }

    /// Whether no policies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Looks up a policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyNotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&VersionPolicy> {
        self.policies
            .iter()
            .find(|policy| policy.name() == name)
            .ok_or_else(|| Error::PolicyNotFound {
                name: name.to_string(),
            })
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut VersionPolicy> {
        self.policies
            .iter_mut()
            .find(|policy| policy.name() == name)
            .ok_or_else(|| Error::PolicyNotFound {
                name: name.to_string(),
            })
    }

    /// Bumps one policy, or every policy when `name` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyNotFound`] for unknown names.
    pub fn bump(
        &mut self,
        name: Option<&str>,
        bump: Option<BumpType>,
        identifier: Option<&str>,
    ) -> Result<()> {
        match name {
            Some(name) => self.get_mut(name)?.bump(bump, identifier),
            None => {
                for policy in &mut self.policies {
                    policy.bump(bump, identifier)?;
                }
                Ok(())
            }
        }
    }

    /// Sets a lockstep policy's version. Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyNotFound`] or [`Error::NotLockstep`].
    pub fn update(&mut self, name: &str, version: Version) -> Result<bool> {
        match self.get_mut(name)? {
            VersionPolicy::LockStep(policy) => Ok(policy.update(version)),
            VersionPolicy::Individual(_) => Err(Error::NotLockstep {
                name: name.to_string(),
            }),
        }
    }

    /// Checks every policy member's version against its policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::PolicyNotFound`] or
    /// [`Error::InvalidPolicyVersion`].
    pub fn validate(&self, graph: &ProjectGraph) -> Result<()> {
        for project in graph.projects() {
            if let Some(name) = project.version_policy_name() {
                self.get(name)?.validate(project.version(), project.name())?;
            }
        }
        Ok(())
    }

    /// Whether the project hosts its own changelog.
    ///
    /// Unpublished projects never do. Members of a lockstep policy with a
    /// main project only do if they are that project.
    #[must_use]
    pub fn is_main_project(&self, project: &Project) -> bool {
        if !project.should_publish() {
            return false;
        }
        let Some(name) = project.version_policy_name() else {
            return true;
        };
        match self.get(name).ok().and_then(VersionPolicy::as_lockstep) {
            Some(LockStepPolicy {
                main_project: Some(main),
                ..
            }) => main == project.name(),
            _ => true,
        }
    }

    /// Members of lockstep policies whose version is driven by `nextBump`
    /// rather than change files.
    #[must_use]
    pub fn manually_versioned_projects(&self, graph: &ProjectGraph) -> BTreeSet<String> {
        graph
            .projects()
            .filter(|project| {
                project
                    .version_policy_name()
                    .and_then(|name| self.get(name).ok())
                    .and_then(VersionPolicy::as_lockstep)
                    .is_some_and(|policy| policy.next_bump.is_some())
            })
            .map(|project| project.name().to_string())
            .collect()
    }
}

fn parse_manifest_version(manifest: &PackageManifest) -> Result<Version> {
    Version::parse(&manifest.version).map_err(|_| Error::invalid_version(&manifest.version))
}
