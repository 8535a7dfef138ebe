//! Keeping project versions in line with their version policies.
//!
//! [`VersionManager::ensure`] moves policy members to the version their
//! policy dictates and then repairs every in-repo dependency declaration
//! that no longer accepts the moved producer, generating change
//! descriptors for the consumers. [`VersionManager::bump`] advances the
//! policies first and then runs the whole release pipeline over the
//! pending change files.

use crate::DryRun;
use crate::change::{ChangeDescriptor, ChangeFile, ChangeType};
use crate::error::{Error, Result};
use crate::policy::{BumpType, PolicyRegistry};
use crate::range::{WriteMode, rewrite};
use crate::resolve::{ChangeRequests, ChangeResolver};
use crate::version::is_prerelease;
use crate::writer::PackageWriter;
use cascade_workspace::{DependencyKind, DependencySpecifier, PackageManifest, Project, ProjectGraph};
use semver::Version;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Tables whose declarations follow a moved producer.
const TRACKED_KINDS: [DependencyKind; 3] = [
    DependencyKind::Runtime,
    DependencyKind::Dev,
    DependencyKind::Peer,
];

/// Manifests and change descriptors produced by a policy pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionUpdate {
    /// Updated manifest per package.
    pub manifests: BTreeMap<String, PackageManifest>,
    /// Generated changes per package.
    pub changes: BTreeMap<String, Vec<ChangeDescriptor>>,
}

impl VersionUpdate {
    /// Whether the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty() && self.changes.is_empty()
    }

    /// Every generated change descriptor, in package order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ChangeDescriptor> {
        self.changes.values().flatten().cloned().collect()
    }

    /// One change file per package with generated changes.
    #[must_use]
    pub fn change_files(&self, email: Option<&str>) -> Vec<ChangeFile> {
        self.changes
            .iter()
            .map(|(package, changes)| {
                let mut file = ChangeFile::new(package.clone());
                file.email = email.map(str::to_string);
                for change in changes {
                    file.add_change(change);
                }
                file
            })
            .collect()
    }

    fn add_changes(&mut self, package: &str, changes: Vec<ChangeDescriptor>) {
        if changes.is_empty() {
            return;
        }
        let recorded = self.changes.entry(package.to_string()).or_default();
        for change in changes {
            if !recorded.contains(&change) {
                recorded.push(change);
            }
        }
    }
}

/// Result of [`VersionManager::bump`].
#[derive(Debug, Clone, Default)]
pub struct BumpOutcome {
    /// Manifests moved by the policies plus those written from change files.
    pub update: VersionUpdate,
    /// The resolved change requests applied on top of the policy pass.
    pub requests: ChangeRequests,
}

/// Drives version policies across a workspace.
#[derive(Debug)]
pub struct VersionManager<'a> {
    graph: &'a ProjectGraph,
    registry: PolicyRegistry,
    hotfix_enabled: bool,
}

impl<'a> VersionManager<'a> {
    /// Creates a manager over `graph` owning `registry`.
    #[must_use]
    pub const fn new(graph: &'a ProjectGraph, registry: PolicyRegistry) -> Self {
        Self {
            graph,
            registry,
            hotfix_enabled: true,
        }
    }

    /// Allows or rejects hotfix change descriptors during [`Self::bump`].
    #[must_use]
    pub const fn with_hotfix_enabled(mut self, enabled: bool) -> Self {
        self.hotfix_enabled = enabled;
        self
    }

    /// The policies, including any version moved by [`Self::bump`].
    #[must_use]
    pub const fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Consumes the manager, returning the policies for persisting.
    #[must_use]
    pub fn into_registry(self) -> PolicyRegistry {
        self.registry
    }

    /// Moves members of `policy` (or of every policy) to their policy
    /// version, then updates dependency declarations until they all accept
    /// the new versions.
    ///
    /// Nothing is written to disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyNotFound`] for unknown policies, and the
    /// policy errors raised by a member whose version is out of bounds.
    pub fn ensure(&self, policy: Option<&str>, force: bool) -> Result<VersionUpdate> {
        let mut update = VersionUpdate::default();
        self.update_versions_by_policy(policy, force, &mut update)?;

        let mut passes = 0usize;
        loop {
            passes += 1;
            let mut changed = false;
            for project in self.graph.projects() {
                changed |= self.update_dependencies(project, &mut update)?;
            }
            if !changed {
                break;
            }
        }
        debug!(passes, packages = update.manifests.len(), "Dependency versions settled");
        Ok(update)
    }

    /// Advances lockstep policies, then applies the pending change
    /// `descriptors` on top of the moved versions.
    ///
    /// Without `policy` every lockstep policy is bumped. `bump` and
    /// `identifier` override the policy's next bump and prerelease
    /// channel. Members of policies driven by `nextBump` are excluded from
    /// change-file bumps. The descriptors generated by the policy pass are
    /// resolved together with `descriptors`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::ensure`], of change resolution, and of
    /// the package writer.
    pub fn bump(
        &mut self,
        policy: Option<&str>,
        bump: Option<BumpType>,
        identifier: Option<&str>,
        descriptors: &[ChangeDescriptor],
        dry_run: DryRun,
    ) -> Result<BumpOutcome> {
        self.registry.bump(policy, bump, identifier)?;
        let mut update = self.ensure(policy, false)?;

        let graph = self.graph.with_updated_manifests(&update.manifests)?;
        let excluded = self.registry.manually_versioned_projects(&graph);
        info!(
            mode = dry_run.label(),
            excluded = excluded.len(),
            policy_changes = update.changes.len(),
            "Applying change files"
        );

        let mut input = update.descriptors();
        input.extend(descriptors.iter().cloned());

        let mut requests = ChangeResolver::new(&graph, &self.registry)
            .with_excluded(excluded.clone())
            .with_hotfix_enabled(self.hotfix_enabled)
            .resolve(&input)?;
        let outcome = PackageWriter::new(&graph)
            .with_excluded(excluded)
            .apply(&mut requests, dry_run)?;
        update.manifests.extend(outcome.manifests);

        Ok(BumpOutcome { update, requests })
    }

    fn update_versions_by_policy(
        &self,
        policy: Option<&str>,
        force: bool,
        update: &mut VersionUpdate,
    ) -> Result<()> {
        if let Some(name) = policy {
            self.registry.get(name)?;
        }

        for project in self.graph.projects() {
            let Some(policy_name) = project.version_policy_name() else {
                continue;
            };
            if policy.is_some_and(|name| name != policy_name) {
                continue;
            }
            let Some(updated) = self.registry.get(policy_name)?.ensure(project.manifest(), force)?
            else {
                continue;
            };

            let version = parse_version(&updated.version)?;
            info!(
                package = project.name(),
                from = project.version(),
                to = %version,
                policy = policy_name,
                "Moving project to policy version"
            );
            if !is_prerelease(&version) && self.registry.is_main_project(project) {
                update.add_changes(
                    project.name(),
                    vec![
                        ChangeDescriptor::new(project.name(), ChangeType::None).with_version(version),
                    ],
                );
            }
            update.manifests.insert(project.name().to_string(), updated);
        }
        Ok(())
    }

    /// Rewrites `project`'s declarations of every moved package. Returns
    /// whether any declaration changed.
    fn update_dependencies(&self, project: &Project, update: &mut VersionUpdate) -> Result<bool> {
        let (mut manifest, version_changed) = match update.manifests.get(project.name()) {
            Some(manifest) => (manifest.clone(), true),
            None => (project.manifest().clone(), false),
        };

        let moved: Vec<(String, Version)> = update
            .manifests
            .iter()
            .map(|(name, m)| Ok((name.clone(), parse_version(&m.version)?)))
            .collect::<Result<_>>()?;

        let mut changes = Vec::new();
        let mut updated = false;
        for kind in TRACKED_KINDS {
            for (producer, version) in &moved {
                let Some(old) = manifest.table(kind).get(producer).cloned() else {
                    continue;
                };
                if project.is_decoupled(producer) {
                    debug!(package = project.name(), dependency = %producer, "Skipping decoupled dependency");
                    continue;
                }
                let new = rewrite(&old, version, WriteMode::Commit);
                if new == old {
                    continue;
                }
                updated = true;
                if self.should_track(project, producer) {
                    track_dependency_change(
                        &mut changes,
                        &manifest,
                        version_changed,
                        producer,
                        version,
                        &old,
                        &new,
                    );
                }
                debug!(package = project.name(), dependency = %producer, from = %old, to = %new, "Updating dependency range");
                manifest.table_mut(kind).insert(producer.clone(), new);
            }
        }

        if updated {
            update.manifests.insert(project.name().to_string(), manifest);
            update.add_changes(project.name(), changes);
        }
        Ok(updated)
    }

    /// Lockstep members only record dependency changes on their main
    /// project, and only for producers outside their own policy.
    fn should_track(&self, project: &Project, producer: &str) -> bool {
        let Some(producer) = self.graph.get(producer) else {
            return false;
        };
        if !project.should_publish() {
            return false;
        }
        let lockstep = project
            .version_policy_name()
            .and_then(|name| self.registry.get(name).ok())
            .is_some_and(|policy| policy.is_lockstep());
        !lockstep
            || (self.registry.is_main_project(project)
                && producer.version_policy_name() != project.version_policy_name())
    }
}

fn track_dependency_change(
    changes: &mut Vec<ChangeDescriptor>,
    consumer: &PackageManifest,
    version_changed: bool,
    producer: &str,
    producer_version: &Version,
    old: &str,
    new: &str,
) {
    let mut push = |change: ChangeDescriptor| {
        if !changes.contains(&change) {
            changes.push(change);
        }
    };

    if !DependencySpecifier::parse(old).satisfies(producer_version) && !version_changed {
        push(ChangeDescriptor::new(consumer.name.clone(), ChangeType::Patch));
    }

    let consumer_prerelease = Version::parse(&consumer.version).is_ok_and(|v| is_prerelease(&v));
    if !is_prerelease(producer_version) && !consumer_prerelease {
        push(
            ChangeDescriptor::new(consumer.name.clone(), ChangeType::Dependency).with_comment(
                format!("Dependency {producer} version bump from {old} to {new}."),
            ),
        );
    }
}

fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version).map_err(|_| Error::invalid_version(version))
}
