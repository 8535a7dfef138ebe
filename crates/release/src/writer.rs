//! Applying resolved changes to package manifests.
//!
//! [`PackageWriter::apply`] produces updated manifest snapshots in memory and
//! records a `dependency` comment on each consumer whose declared range was
//! rewritten. [`PackageWriter::save`] persists snapshots; callers decide
//! whether to call it.

use crate::DryRun;
use crate::change::{ChangeDescriptor, ChangeType};
use crate::error::{Error, Result};
use crate::policy::{CommitFormat, PolicyRegistry, PublishFormat};
use crate::prerelease::PrereleaseToken;
use crate::range::{WriteMode, pin, publish_form, rewrite};
use crate::resolve::{ChangeRequests, ResolvedChange};
use crate::version::{ReleaseType, increment};
use cascade_workspace::{
    DependencyKind, DependencySpecifier, PackageManifest, Project, ProjectGraph, Workspace,
};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

/// One rewritten dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRewrite {
    /// The consumer whose manifest changed.
    pub package_name: String,
    /// The table holding the declaration.
    pub kind: DependencyKind,
    /// The declaration key.
    pub dependency: String,
    /// Declared value before the write.
    pub from: String,
    /// Declared value after the write.
    pub to: String,
}

/// Updated manifests and the rewrites that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Updated manifest per changed package.
    pub manifests: BTreeMap<String, PackageManifest>,
    /// Every dependency declaration that changed.
    pub rewrites: Vec<DependencyRewrite>,
}

/// The version a change is written with once the prerelease token applies.
///
/// Under a partial prerelease, packages with a hotfix or smaller change keep
/// their version. A dependency-only change under a prerelease name moves to
/// the next patch so the prerelease sorts above the current release.
///
/// # Errors
///
/// Returns an error if the version cannot be incremented.
pub fn change_info_new_version(change: &ResolvedChange, token: &PrereleaseToken) -> Result<String> {
    let Some(value) = token.value() else {
        return Ok(change.new_version.to_string());
    };
    if token.is_partial() && change.change_type <= ChangeType::Hotfix {
        return Ok(change.new_version.to_string());
    }
    let version = if token.is_prerelease() && change.change_type == ChangeType::Dependency {
        increment(&change.new_version, ReleaseType::Patch, None)?
    } else {
        change.new_version.clone()
    };
    Ok(format!("{version}-{value}"))
}

/// [`change_info_new_version`] as a [`Version`]: the version a published
/// package carries in its manifest, registry entry and release tag.
///
/// # Errors
///
/// Returns an error if the version cannot be computed or parsed.
pub fn written_version(change: &ResolvedChange, token: &PrereleaseToken) -> Result<Version> {
    let version = change_info_new_version(change, token)?;
    Version::parse(&version).map_err(|_| Error::invalid_version(version))
}

/// Writes resolved changes into manifests.
#[derive(Debug)]
pub struct PackageWriter<'a> {
    graph: &'a ProjectGraph,
    token: PrereleaseToken,
    excluded: BTreeSet<String>,
    mode: WriteMode,
}

impl<'a> PackageWriter<'a> {
    /// Creates a writer for committed manifests.
    #[must_use]
    pub fn new(graph: &'a ProjectGraph) -> Self {
        Self {
            graph,
            token: PrereleaseToken::none(),
            excluded: BTreeSet::new(),
            mode: WriteMode::Commit,
        }
    }

    /// Sets the prerelease token. Must match the one used for resolution.
    #[must_use]
    pub fn with_prerelease(mut self, token: PrereleaseToken) -> Self {
        self.token = token;
        self
    }

    /// Excludes packages from version bumps.
    #[must_use]
    pub fn with_excluded(mut self, excluded: BTreeSet<String>) -> Self {
        self.excluded = excluded;
        self
    }

    /// Sets the write mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    fn skips_version_bump(&self, project: &Project) -> bool {
        !project.should_publish() || self.excluded.contains(project.name())
    }

    /// Produces the updated manifest of every changed package.
    ///
    /// Comments describing each rewritten dependency are appended to the
    /// consumer's contributing descriptors in `requests`.
    ///
    /// # Errors
    ///
    /// Returns an error if a changed package is not in the graph or a
    /// prerelease version cannot be computed.
    pub fn apply(&self, requests: &mut ChangeRequests, dry_run: DryRun) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        let names: Vec<String> = requests.iter().map(|c| c.package_name.clone()).collect();

        for name in names {
            let project = self.graph.project(&name)?;
            let Some(change) = requests.get(&name) else {
                continue;
            };

            let skip = self.skips_version_bump(project);
            let new_version = if skip {
                project.version().to_string()
            } else {
                change_info_new_version(change, &self.token)?
            };
            if skip {
                info!(mode = dry_run.label(), package = %name, version = %new_version, "Update without version bump");
            } else {
                info!(
                    mode = dry_run.label(),
                    package = %name,
                    change_type = %change.change_type,
                    version = %new_version,
                    "Updating package version"
                );
            }

            let mut manifest = project.manifest().clone();
            manifest.version = new_version;

            let mut comments = Vec::new();
            for kind in DependencyKind::ALL {
                let declared: Vec<(String, String)> = manifest
                    .table(kind)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in declared {
                    let Some((written, comment)) = self.write_dependency(project, &key, &value, requests)?
                    else {
                        continue;
                    };
                    comments.extend(comment);
                    if written == value {
                        continue;
                    }
                    info!(
                        mode = dry_run.label(),
                        package = %name,
                        dependency = %key,
                        from = %value,
                        to = %written,
                        "Updating dependency"
                    );
                    manifest.table_mut(kind).insert(key.clone(), written.clone());
                    outcome.rewrites.push(DependencyRewrite {
                        package_name: name.clone(),
                        kind,
                        dependency: key,
                        from: value,
                        to: written,
                    });
                }
            }

            if let Some(entry) = requests.get_mut(&name) {
                for comment in comments {
                    let descriptor =
                        ChangeDescriptor::new(name.clone(), ChangeType::Dependency).with_comment(comment);
                    if !entry.changes.contains(&descriptor) {
                        entry.changes.push(descriptor);
                    }
                }
                for descriptor in &entry.changes {
                    if let Some(comment) = &descriptor.comment {
                        debug!(package = %name, change_type = %descriptor.change_type, %comment, "Change");
                    }
                }
            }

            outcome.manifests.insert(name, manifest);
        }

        Ok(outcome)
    }

    /// Computes the new value of one declaration, and the changelog comment
    /// for range rewrites. Returns `None` when the declaration is left alone.
    fn write_dependency(
        &self,
        project: &Project,
        key: &str,
        value: &str,
        requests: &ChangeRequests,
    ) -> Result<Option<(String, Option<String>)>> {
        let specifier = DependencySpecifier::parse(value);
        let target = specifier.alias_target().unwrap_or(key);
        if project.is_decoupled(key) || project.is_decoupled(target) {
            return Ok(None);
        }
        let Some(dep_change) = requests.get(target) else {
            return Ok(None);
        };
        let Some(dep_project) = self.graph.get(target) else {
            return Ok(None);
        };
        if self.skips_version_bump(dep_project) {
            return Ok(None);
        }

        if self.token.has_value() {
            if self.token.is_partial() && dep_change.change_type < ChangeType::Hotfix {
                return Ok(None);
            }
            let version = change_info_new_version(dep_change, &self.token)?;
            return Ok(Some((pin(value, &version, self.mode), None)));
        }

        if dep_change.change_type < ChangeType::Hotfix {
            return Ok(None);
        }

        let written = rewrite(value, &dep_change.new_version, self.mode);
        let (from, to) = match &specifier {
            DependencySpecifier::Workspace(range) if range.is_wildcard() => {
                (None, publish_form(range, &dep_change.new_version))
            }
            other => (other.range_text(), dep_change.new_version.to_string()),
        };
        let comment = match from {
            Some(from) => format!("Updating dependency \"{target}\" from `{from}` to `{to}`"),
            None => format!("Updating dependency \"{target}\" to `{to}`"),
        };
        Ok(Some((written, Some(comment))))
    }

    /// Applies each policy's dependency format to the manifests of its
    /// members, loading unchanged members from the graph as needed.
    ///
    /// In [`WriteMode::Publish`] policies with `exact` pin runtime, peer and
    /// optional local dependencies to the local version. In
    /// [`WriteMode::Commit`] policies with `wildcard` set them to `*`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PolicyNotFound`] for unknown policies.
    pub fn apply_policy_formats(
        &self,
        registry: &PolicyRegistry,
        manifests: &mut BTreeMap<String, PackageManifest>,
    ) -> Result<()> {
        const KINDS: [DependencyKind; 3] = [
            DependencyKind::Runtime,
            DependencyKind::Optional,
            DependencyKind::Peer,
        ];

        for project in self.graph.projects() {
            let Some(policy_name) = project.version_policy_name() else {
                continue;
            };
            let format = registry.get(policy_name)?.dependency_policy();
            let pin_exact = self.mode == WriteMode::Publish
                && format.version_format_for_publish == PublishFormat::Exact;
            let wildcard = self.mode == WriteMode::Commit
                && format.version_format_for_commit == CommitFormat::Wildcard;
            if !pin_exact && !wildcard {
                continue;
            }

            let mut manifest = manifests
                .get(project.name())
                .cloned()
                .unwrap_or_else(|| project.manifest().clone());
            let mut modified = false;
            for kind in KINDS {
                let keys: Vec<String> = manifest.table(kind).keys().cloned().collect();
                for key in keys {
                    let Some(local) = self.graph.get(&key) else {
                        continue;
                    };
                    let value = if wildcard {
                        "*".to_string()
                    } else {
                        manifests
                            .get(local.name())
                            .map_or_else(|| local.version().to_string(), |m| m.version.clone())
                    };
                    if manifest.table(kind).get(&key) != Some(&value) {
                        debug!(package = project.name(), dependency = %key, %value, policy = policy_name, "Applying policy dependency format");
                        manifest.table_mut(kind).insert(key, value);
                        modified = true;
                    }
                }
            }
            if modified {
                manifests.insert(project.name().to_string(), manifest);
            }
        }
        Ok(())
    }

    /// Writes manifests to their project folders.
    ///
    /// Returns the paths written (or that would be written).
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn save(
        workspace: &Workspace,
        manifests: &BTreeMap<String, PackageManifest>,
        dry_run: DryRun,
    ) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(manifests.len());
        for (name, manifest) in manifests {
            let path = workspace.manifest_path(name)?;
            info!(mode = dry_run.label(), package = %name, path = %path.display(), "Saving manifest");
            if !dry_run.is_dry_run() {
                manifest.write(&path)?;
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DependencyPolicy, IndividualPolicy, VersionPolicy};
    use crate::resolve::ChangeResolver;
    use semver::Version;

    fn resolve(graph: &ProjectGraph, descriptors: &[ChangeDescriptor]) -> ChangeRequests {
        ChangeResolver::new(graph, &PolicyRegistry::default())
            .resolve(descriptors)
            .unwrap()
    }

    fn resolved(change_type: ChangeType, version: &str) -> ResolvedChange {
        ResolvedChange {
            package_name: "a".to_string(),
            change_type,
            new_version: Version::parse(version).unwrap(),
            new_range: String::new(),
            order: 0,
            changes: Vec::new(),
        }
    }

    #[test]
    fn test_change_info_new_version() {
        let none = PrereleaseToken::none();
        assert_eq!(change_info_new_version(&resolved(ChangeType::Patch, "1.0.1"), &none).unwrap(), "1.0.1");

        let beta = PrereleaseToken::prerelease("beta");
        assert_eq!(
            change_info_new_version(&resolved(ChangeType::Minor, "1.1.0"), &beta).unwrap(),
            "1.1.0-beta"
        );
        assert_eq!(
            change_info_new_version(&resolved(ChangeType::Dependency, "1.0.0"), &beta).unwrap(),
            "1.0.1-beta"
        );

        let partial = PrereleaseToken::prerelease("beta").with_partial(true);
        assert_eq!(
            change_info_new_version(&resolved(ChangeType::Dependency, "1.0.0"), &partial).unwrap(),
            "1.0.0"
        );
        assert_eq!(
            change_info_new_version(&resolved(ChangeType::Patch, "1.0.1"), &partial).unwrap(),
            "1.0.1-beta"
        );

        let suffix = PrereleaseToken::suffix("rc");
        assert_eq!(
            change_info_new_version(&resolved(ChangeType::None, "1.0.0"), &suffix).unwrap(),
            "1.0.0-rc"
        );
    }

    #[test]
    fn test_rewrites_range_and_records_comment() {
        let graph = ProjectGraph::new([
            Project::builder("lib", "1.0.0").build(),
            Project::builder("app", "1.0.0").dependency("lib", "~1.0.0").build(),
        ])
        .unwrap();
        let mut requests = resolve(&graph, &[ChangeDescriptor::new("lib", ChangeType::Minor)]);
        let outcome = PackageWriter::new(&graph).apply(&mut requests, DryRun::Yes).unwrap();

        assert_eq!(outcome.manifests["lib"].version, "1.1.0");
        assert_eq!(outcome.manifests["app"].dependencies["lib"], "~1.1.0");
        assert_eq!(outcome.manifests["app"].version, "1.0.1");
        assert_eq!(outcome.rewrites.len(), 1);

        let comments: Vec<_> = requests
            .get("app")
            .unwrap()
            .changes
            .iter()
            .filter_map(|d| d.comment.clone())
            .collect();
        assert_eq!(comments, ["Updating dependency \"lib\" from `~1.0.0` to `1.1.0`"]);
    }

    #[test]
    fn test_dependency_only_producer_is_not_rewritten() {
        let graph = ProjectGraph::new([
            Project::builder("c", "1.0.0").build(),
            Project::builder("b", "1.0.0").dependency("c", "^1.0.0").build(),
            Project::builder("a", "1.0.0").dependency("b", "^1.0.0").build(),
        ])
        .unwrap();
        let mut requests = resolve(&graph, &[ChangeDescriptor::new("c", ChangeType::Patch)]);
        let outcome = PackageWriter::new(&graph).apply(&mut requests, DryRun::Yes).unwrap();

        assert_eq!(outcome.manifests["b"].dependencies["c"], "^1.0.1");
        assert_eq!(outcome.manifests["b"].version, "1.0.0");
        assert_eq!(outcome.manifests["a"].dependencies["b"], "^1.0.0");
    }

    #[test]
    fn test_workspace_wildcard_comment_omits_from() {
        let graph = ProjectGraph::new([
            Project::builder("e", "1.0.0").build(),
            Project::builder("d", "1.0.0").dependency("e", "workspace:*").build(),
        ])
        .unwrap();
        let mut requests = resolve(&graph, &[ChangeDescriptor::new("e", ChangeType::Major)]);
        let outcome = PackageWriter::new(&graph).apply(&mut requests, DryRun::Yes).unwrap();

        assert_eq!(outcome.manifests["d"].dependencies["e"], "workspace:*");
        let comment = requests.get("d").unwrap().changes.last().unwrap().comment.clone();
        assert_eq!(comment.as_deref(), Some("Updating dependency \"e\" to `2.0.0`"));
    }

    #[test]
    fn test_unpublished_dependency_is_left_alone() {
        let graph = ProjectGraph::new([
            Project::builder("tool", "1.0.0").should_publish(false).build(),
            Project::builder("app", "1.0.0").dev_dependency("tool", "workspace:*").build(),
        ])
        .unwrap();
        let mut requests = resolve(&graph, &[ChangeDescriptor::new("tool", ChangeType::Minor)]);
        let outcome = PackageWriter::new(&graph).apply(&mut requests, DryRun::Yes).unwrap();
        assert_eq!(outcome.manifests["tool"].version, "1.0.0");
        assert!(outcome.rewrites.is_empty());
    }

    #[test]
    fn test_policy_formats() {
        let graph = ProjectGraph::new([
            Project::builder("core", "2.0.0").build(),
            Project::builder("plugin", "1.0.0")
                .dependency("core", "^2.0.0")
                .dev_dependency("core", "^2.0.0")
                .version_policy("plugins")
                .build(),
        ])
        .unwrap();
        let registry = PolicyRegistry::new([VersionPolicy::Individual(IndividualPolicy {
            dependencies: Some(DependencyPolicy {
                version_format_for_commit: CommitFormat::Wildcard,
                version_format_for_publish: PublishFormat::Exact,
            }),
            ..IndividualPolicy::new("plugins")
        })])
        .unwrap();

        let mut published = BTreeMap::new();
        PackageWriter::new(&graph)
            .with_mode(WriteMode::Publish)
            .apply_policy_formats(&registry, &mut published)
            .unwrap();
        assert_eq!(published["plugin"].dependencies["core"], "2.0.0");
        assert_eq!(published["plugin"].dev_dependencies["core"], "^2.0.0");

        let mut committed = BTreeMap::new();
        PackageWriter::new(&graph)
            .apply_policy_formats(&registry, &mut committed)
            .unwrap();
        assert_eq!(committed["plugin"].dependencies["core"], "*");
    }
}
