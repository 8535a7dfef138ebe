//! Workspace projects.

use crate::error::{Error, Result};
use crate::manifest::{DependencyKind, PackageManifest};
use crate::specifier::DependencySpecifier;
use semver::Version;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// One package of the workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    manifest: PackageManifest,
    folder: PathBuf,
    publish_flag: bool,
    version_policy_name: Option<String>,
    decoupled: BTreeSet<String>,
}

/// A declaration in one of a project's dependency tables that refers to a
/// given package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyReference<'a> {
    /// The table the declaration lives in.
    pub kind: DependencyKind,
    /// The key in the table (differs from the package name for aliases).
    pub key: &'a str,
    /// The declared value.
    pub value: &'a str,
}

impl Project {
    /// Creates a project from a loaded manifest.
    #[must_use]
    pub fn new(manifest: PackageManifest, folder: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            folder: folder.into(),
            publish_flag: false,
            version_policy_name: None,
            decoupled: BTreeSet::new(),
        }
    }

    /// Starts building a project in memory.
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ProjectBuilder {
        ProjectBuilder::new(name, version)
    }

    /// Replaces the manifest, keeping the project's configuration.
    #[must_use]
    pub fn with_manifest(mut self, manifest: PackageManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Sets the project's own publish flag.
    #[must_use]
    pub const fn with_publish_flag(mut self, publish: bool) -> Self {
        self.publish_flag = publish;
        self
    }

    /// Assigns a version policy.
    #[must_use]
    pub fn with_version_policy(mut self, policy: Option<String>) -> Self {
        self.version_policy_name = policy;
        self
    }

    /// Replaces the decoupled local dependency set.
    #[must_use]
    pub fn with_decoupled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoupled = names.into_iter().map(Into::into).collect();
        self
    }

    /// Package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Current manifest version, unparsed.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.manifest.version
    }

    /// Current manifest version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidVersion`] if the manifest version is not semver.
    pub fn parsed_version(&self) -> Result<Version> {
        Version::parse(self.version()).map_err(|_| Error::InvalidVersion {
            project: self.name().to_string(),
            version: self.version().to_string(),
        })
    }

    /// The loaded manifest.
    #[must_use]
    pub const fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    /// Folder holding the project's manifest.
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Name of the assigned version policy.
    #[must_use]
    pub fn version_policy_name(&self) -> Option<&str> {
        self.version_policy_name.as_deref()
    }

    /// Whether the project is published.
    ///
    /// Any project with a version policy publishes regardless of its own flag.
    #[must_use]
    pub const fn should_publish(&self) -> bool {
        self.publish_flag || self.version_policy_name.is_some()
    }

    /// Whether `dependency` is excluded from cycle detection and propagation.
    #[must_use]
    pub fn is_decoupled(&self, dependency: &str) -> bool {
        self.decoupled.contains(dependency)
    }

    /// The decoupled local dependency names.
    #[must_use]
    pub const fn decoupled(&self) -> &BTreeSet<String> {
        &self.decoupled
    }

    /// Every declaration across `kinds` that refers to `package`, directly or
    /// through an `npm:` alias.
    pub fn references<'a>(
        &'a self,
        package: &'a str,
        kinds: &'a [DependencyKind],
    ) -> impl Iterator<Item = DependencyReference<'a>> + 'a {
        kinds.iter().flat_map(move |&kind| {
            self.manifest
                .table(kind)
                .iter()
                .filter(move |(key, value)| {
                    key.as_str() == package
                        || DependencySpecifier::parse(value).alias_target() == Some(package)
                })
                .map(move |(key, value)| DependencyReference {
                    kind,
                    key,
                    value,
                })
        })
    }
}

/// Builder for in-memory projects.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    manifest: PackageManifest,
    folder: Option<PathBuf>,
    publish_flag: bool,
    version_policy_name: Option<String>,
    decoupled: BTreeSet<String>,
}

impl ProjectBuilder {
    /// Creates a builder for a published project with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            manifest: PackageManifest::new(name, version),
            folder: None,
            publish_flag: true,
            version_policy_name: None,
            decoupled: BTreeSet::new(),
        }
    }

    /// Adds a runtime dependency.
    #[must_use]
    pub fn dependency(self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.declare(DependencyKind::Runtime, name, range)
    }

    /// Adds a development dependency.
    #[must_use]
    pub fn dev_dependency(self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.declare(DependencyKind::Dev, name, range)
    }

    /// Adds a peer dependency.
    #[must_use]
    pub fn peer_dependency(self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.declare(DependencyKind::Peer, name, range)
    }

    /// Adds an optional dependency.
    #[must_use]
    pub fn optional_dependency(self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.declare(DependencyKind::Optional, name, range)
    }

    /// Adds a declaration to any table.
    #[must_use]
    pub fn declare(
        mut self,
        kind: DependencyKind,
        name: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        self.manifest
            .table_mut(kind)
            .insert(name.into(), range.into());
        self
    }

    /// Sets the project's own publish flag.
    #[must_use]
    pub const fn should_publish(mut self, publish: bool) -> Self {
        self.publish_flag = publish;
        self
    }

    /// Assigns a version policy.
    #[must_use]
    pub fn version_policy(mut self, policy: impl Into<String>) -> Self {
        self.version_policy_name = Some(policy.into());
        self
    }

    /// Excludes a dependency from cycle detection and propagation.
    #[must_use]
    pub fn decouple(mut self, dependency: impl Into<String>) -> Self {
        self.decoupled.insert(dependency.into());
        self
    }

    /// Sets the project folder.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Finishes the project.
    #[must_use]
    pub fn build(self) -> Project {
        let folder = self
            .folder
            .unwrap_or_else(|| PathBuf::from(&self.manifest.name));
        Project {
            manifest: self.manifest,
            folder,
            publish_flag: self.publish_flag,
            version_policy_name: self.version_policy_name,
            decoupled: self.decoupled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_forces_publish() {
        let project = Project::builder("a", "1.0.0")
            .should_publish(false)
            .version_policy("lockstep")
            .build();
        assert!(project.should_publish());

        let private = Project::builder("b", "1.0.0").should_publish(false).build();
        assert!(!private.should_publish());
    }

    #[test]
    fn test_references_follow_aliases() {
        let project = Project::builder("app", "1.0.0")
            .dependency("lib", "^1.0.0")
            .dev_dependency("lib-alias", "npm:lib@^1.0.0")
            .peer_dependency("lib", ">=1.0.0 <2.0.0")
            .dependency("other", "^1.0.0")
            .build();

        let refs: Vec<_> = project.references("lib", &DependencyKind::ALL).collect();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[1].key, "lib-alias");
        assert_eq!(refs[1].kind, DependencyKind::Dev);

        let graph_refs = project.references("lib", &DependencyKind::GRAPH).count();
        assert_eq!(graph_refs, 2);
    }

    #[test]
    fn test_parsed_version_error() {
        let project = Project::builder("a", "not-a-version").build();
        let err = project.parsed_version().unwrap_err();
        assert!(err.to_string().contains("not-a-version"));
    }

    #[test]
    fn test_builder_defaults() {
        let project = Project::builder("a", "1.0.0").decouple("b").build();
        assert!(project.should_publish());
        assert!(project.is_decoupled("b"));
        assert_eq!(project.folder(), Path::new("a"));
        assert_eq!(project.version_policy_name(), None);
    }
}
