//! Change propagation.
//!
//! [`ChangeResolver::resolve`] turns change descriptors into a closed set of
//! [`ResolvedChange`]s: every package named by a descriptor, every consumer
//! whose declared range must be rewritten or republished as a result, and
//! every member of a lockstep policy that one of its members moved.
//!
//! Resolution is a fixed point. Each round propagates every resolved change
//! to its consumers, then applies pending lockstep policy versions to policy
//! members. Rounds repeat until one changes nothing. Within a round,
//! downstream propagation uses an explicit worklist, so chains of any depth
//! are visited without recursion.
//!
//! The resolver never touches manifests; writing is a separate phase (see
//! [`crate::writer`]) so a failed resolution leaves the workspace untouched.

use crate::change::{ChangeDescriptor, ChangeType};
use crate::error::{Error, Result};
use crate::policy::{PolicyRegistry, VersionPolicy};
use crate::prerelease::PrereleaseToken;
use crate::version::{ReleaseType, increment, is_prerelease, new_range_dependency};
use cascade_workspace::{DependencyKind, DependencySpecifier, Project, ProjectGraph};
use semver::{Prerelease, Version};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};

/// Where a descriptor merged by the resolver came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Read from a change file or passed by the caller.
    Authored,
    /// Produced by propagation or a lockstep policy; regenerated every round.
    Generated,
}

/// Resolution state of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChange {
    /// The package.
    pub package_name: String,
    /// Largest magnitude over all contributing descriptors.
    pub change_type: ChangeType,
    /// Version the package will be released at.
    pub new_version: Version,
    /// Range consumers should declare for the new version.
    pub new_range: String,
    /// Publish order; producers come before their consumers.
    pub order: usize,
    /// Every descriptor that contributed, in arrival order.
    pub changes: Vec<ChangeDescriptor>,
}

impl ResolvedChange {
    /// Whether the package is republished at a new version.
    #[must_use]
    pub const fn is_release(&self) -> bool {
        self.change_type.is_release()
    }
}

/// A pending version for a lockstep policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPolicyChange {
    /// The policy.
    pub policy_name: String,
    /// Magnitude of the member change that set the version.
    pub change_type: ChangeType,
    /// The policy's new shared version.
    pub new_version: Version,
}

/// Result of a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequests {
    package_changes: BTreeMap<String, ResolvedChange>,
    policy_changes: BTreeMap<String, VersionPolicyChange>,
}

impl ChangeRequests {
    /// The change for a package.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&ResolvedChange> {
        self.package_changes.get(package)
    }

    pub(crate) fn get_mut(&mut self, package: &str) -> Option<&mut ResolvedChange> {
        self.package_changes.get_mut(package)
    }

    /// Whether a package has a change.
    #[must_use]
    pub fn contains(&self, package: &str) -> bool {
        self.package_changes.contains_key(package)
    }

    /// Number of changed packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.package_changes.len()
    }

    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.package_changes.is_empty()
    }

    /// Package changes, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedChange> {
        self.package_changes.values()
    }

    /// Pending policy versions, ordered by policy name.
    pub fn policy_changes(&self) -> impl Iterator<Item = &VersionPolicyChange> {
        self.policy_changes.values()
    }

    /// The pending version of one policy.
    #[must_use]
    pub fn policy_change(&self, policy: &str) -> Option<&VersionPolicyChange> {
        self.policy_changes.get(policy)
    }

    /// Package changes in publish order: ascending order, then name.
    #[must_use]
    pub fn sorted(&self) -> Vec<&ResolvedChange> {
        let mut changes: Vec<&ResolvedChange> = self.package_changes.values().collect();
        changes.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.package_name.cmp(&b.package_name))
        });
        changes
    }
}

/// Computes [`ChangeRequests`] from descriptors.
#[derive(Debug)]
pub struct ChangeResolver<'a> {
    graph: &'a ProjectGraph,
    registry: &'a PolicyRegistry,
    token: PrereleaseToken,
    excluded: BTreeSet<String>,
    hotfix_enabled: bool,
}

impl<'a> ChangeResolver<'a> {
    /// Creates a resolver with no prerelease token, no exclusions and
    /// hotfixes enabled.
    #[must_use]
    pub fn new(graph: &'a ProjectGraph, registry: &'a PolicyRegistry) -> Self {
        Self {
            graph,
            registry,
            token: PrereleaseToken::none(),
            excluded: BTreeSet::new(),
            hotfix_enabled: true,
        }
    }

    /// Sets the prerelease token.
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

    /// Enables or disables hotfix changes.
    #[must_use]
    pub const fn with_hotfix_enabled(mut self, enabled: bool) -> Self {
        self.hotfix_enabled = enabled;
        self
    }

    /// The prerelease token in effect.
    #[must_use]
    pub const fn token(&self) -> &PrereleaseToken {
        &self.token
    }

    /// Resolves `descriptors` against the graph.
    ///
    /// Descriptors naming unknown packages are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HotfixConflict`] when a hotfix meets a patch, minor
    /// or major change on one package, [`Error::HotfixDisabled`] when hotfixes
    /// are off, and [`Error::PolicyNotFound`] for unknown policies. No partial
    /// result is returned on error.
    pub fn resolve(&self, descriptors: &[ChangeDescriptor]) -> Result<ChangeRequests> {
        let mut requests = ChangeRequests::default();
        for descriptor in descriptors {
            self.add_change(&mut requests, descriptor.clone(), Origin::Authored)?;
        }

        let mut round = 0usize;
        loop {
            round += 1;
            let mut changed = false;

            let seeds: Vec<String> = requests.package_changes.keys().cloned().collect();
            for seed in seeds {
                changed |= self.propagate(&mut requests, seed)?;
            }
            changed |= self.apply_policy_changes(&mut requests)?;

            debug!(round, packages = requests.len(), changed, "Resolution round");
            if !changed {
                break;
            }
        }

        self.assign_order(&mut requests)?;
        Ok(requests)
    }

    fn skips_version_bump(&self, project: &Project) -> bool {
        self.token.is_suffix() || self.excluded.contains(project.name()) || !project.should_publish()
    }

    /// Merges one descriptor into `requests`. Returns whether the package's
    /// entry is new, its magnitude grew, or it received a higher explicit
    /// version.
    fn add_change(
        &self,
        requests: &mut ChangeRequests,
        descriptor: ChangeDescriptor,
        origin: Origin,
    ) -> Result<bool> {
        let Some(project) = self.graph.get(&descriptor.package_name) else {
            warn!(
                package = %descriptor.package_name,
                "Package was requested for publishing but does not exist; skipping change"
            );
            return Ok(false);
        };
        let current = project.parsed_version()?;
        let incoming = descriptor.change_type;
        let explicit = descriptor.new_version.clone();

        let changed;
        let entry = match requests.package_changes.entry(project.name().to_string()) {
            Entry::Vacant(slot) => {
                changed = true;
                slot.insert(ResolvedChange {
                    package_name: project.name().to_string(),
                    change_type: incoming,
                    new_version: current.clone(),
                    new_range: new_range_dependency(&current),
                    order: 0,
                    changes: Vec::new(),
                })
            }
            Entry::Occupied(slot) => {
                let entry = slot.into_mut();
                let existing = entry.change_type;
                let hotfix_conflict = (existing == ChangeType::Hotfix && incoming > existing)
                    || (incoming == ChangeType::Hotfix && existing > incoming);
                if hotfix_conflict {
                    return Err(Error::HotfixConflict {
                        package: entry.package_name.clone(),
                        existing,
                        incoming,
                    });
                }
                entry.change_type = existing.max(incoming);
                changed = entry.change_type != existing
                    || explicit.as_ref().is_some_and(|v| *v > entry.new_version);
                entry
            }
        };
        if origin == Origin::Authored || !entry.changes.contains(&descriptor) {
            entry.changes.push(descriptor);
        }

        if self.skips_version_bump(project) {
            entry.new_version = explicit.unwrap_or(current);
            entry.new_range = new_range_dependency(&entry.new_version);
            entry.change_type = ChangeType::None;
            return Ok(false);
        }

        if incoming == ChangeType::Hotfix {
            if !self.hotfix_enabled {
                return Err(Error::HotfixDisabled {
                    package: entry.package_name.clone(),
                });
            }
            let mut base = explicit.unwrap_or(current);
            if !is_prerelease(&base) {
                base.pre = Prerelease::new("hotfix")
                    .map_err(|_| Error::internal("Failed to build hotfix prerelease"))?;
            }
            entry.new_version = increment(&base, ReleaseType::Prerelease, None)?;
        } else if entry.change_type != ChangeType::Hotfix {
            // Bumps start from the manifest version, never a previous result.
            let should_bump = explicit.is_none() && incoming >= ChangeType::Hotfix;
            let candidate = match (&explicit, ReleaseType::for_change(entry.change_type)) {
                (None, Some(release)) if should_bump => increment(&current, release, None)?,
                (Some(version), _) => version.clone(),
                _ => current,
            };
            if candidate > entry.new_version {
                entry.new_version = candidate;
            }

            if changed {
                Self::record_policy_change(self.registry, project, entry, &mut requests.policy_changes)?;
            }
        }

        entry.new_range = if entry.change_type == ChangeType::Hotfix {
            entry.new_version.to_string()
        } else {
            new_range_dependency(&entry.new_version)
        };

        Ok(changed)
    }

    fn record_policy_change(
        registry: &PolicyRegistry,
        project: &Project,
        entry: &ResolvedChange,
        policy_changes: &mut BTreeMap<String, VersionPolicyChange>,
    ) -> Result<()> {
        let Some(policy_name) = project.version_policy_name() else {
            return Ok(());
        };
        let VersionPolicy::LockStep(policy) = registry.get(policy_name)? else {
            return Ok(());
        };
        if policy.next_bump.is_some() {
            return Ok(());
        }
        let newer = policy_changes
            .get(policy_name)
            .is_none_or(|pending| entry.new_version > pending.new_version);
        if newer {
            debug!(
                policy = policy_name,
                package = %entry.package_name,
                version = %entry.new_version,
                "Lockstep policy follows member"
            );
            policy_changes.insert(
                policy_name.to_string(),
                VersionPolicyChange {
                    policy_name: policy_name.to_string(),
                    change_type: entry.change_type,
                    new_version: entry.new_version.clone(),
                },
            );
        }
        Ok(())
    }

    /// Propagates the change of `seed` to every transitive consumer that is
    /// affected. Returns whether any entry changed.
    fn propagate(&self, requests: &mut ChangeRequests, seed: String) -> Result<bool> {
        let mut changed = false;
        let mut queue = VecDeque::from([seed]);

        while let Some(producer_name) = queue.pop_front() {
            let Some(producer) = requests.get(&producer_name).cloned() else {
                continue;
            };
            // `dependency` producers propagate too: a rewritten range still has
            // to reach consumers whose declarations no longer match it.
            if producer.change_type == ChangeType::None && !self.token.has_value() {
                continue;
            }

            for consumer in self.graph.consuming_projects(&producer_name) {
                let is_prerelease = self.token.has_value() && !requests.contains(consumer.name());
                let mut change_type = None;
                for reference in consumer.references(&producer_name, &DependencyKind::GRAPH) {
                    let specifier = DependencySpecifier::parse(reference.value);
                    let is_wildcard = specifier.is_workspace_wildcard();
                    let range_text = specifier.range_text().unwrap_or_default();

                    let affected = is_prerelease
                        || if is_wildcard {
                            producer.is_release()
                        } else {
                            range_text != producer.new_range
                        };
                    if !affected {
                        continue;
                    }

                    let required = if producer.change_type == ChangeType::Hotfix {
                        ChangeType::Hotfix
                    } else if !is_wildcard && specifier.satisfies(&producer.new_version) {
                        ChangeType::Dependency
                    } else {
                        ChangeType::Patch
                    };
                    debug!(
                        producer = %producer_name,
                        consumer = consumer.name(),
                        table = %reference.kind,
                        range = reference.value,
                        version = %producer.new_version,
                        change_type = %required,
                        "Propagating change to consumer"
                    );
                    change_type = change_type.max(Some(required));
                }
                let Some(change_type) = change_type else {
                    continue;
                };

                let consumer_changed = self.add_change(
                    requests,
                    ChangeDescriptor::new(consumer.name(), change_type),
                    Origin::Generated,
                )?;
                changed |= consumer_changed;
                if consumer_changed || is_prerelease {
                    queue.push_back(consumer.name().to_string());
                }
            }
        }

        Ok(changed)
    }

    /// Moves every member of a lockstep policy with a pending version to
    /// that version.
    fn apply_policy_changes(&self, requests: &mut ChangeRequests) -> Result<bool> {
        let mut changed = false;
        for project in self.graph.projects() {
            let Some(policy_change) = project
                .version_policy_name()
                .and_then(|name| requests.policy_change(name))
                .cloned()
            else {
                continue;
            };
            let descriptor = ChangeDescriptor::new(project.name(), policy_change.change_type)
                .with_version(policy_change.new_version.clone());
            if self.add_change(requests, descriptor, Origin::Generated)? {
                info!(
                    package = project.name(),
                    version = %policy_change.new_version,
                    policy = %policy_change.policy_name,
                    "Updating to lockstep policy version"
                );
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Gives every consumer an order strictly above each changed producer.
    fn assign_order(&self, requests: &mut ChangeRequests) -> Result<()> {
        for project in self.graph.topological_order()? {
            let Some(order) = requests.get(project.name()).map(|c| c.order) else {
                continue;
            };
            for consumer in self.graph.consuming_projects(project.name()) {
                if let Some(entry) = requests.get_mut(consumer.name()) {
                    entry.order = entry.order.max(order + 1);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LockStepPolicy;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn chain() -> ProjectGraph {
        ProjectGraph::new([
            Project::builder("c", "1.0.0").build(),
            Project::builder("b", "1.0.0").dependency("c", "^1.0.0").build(),
            Project::builder("a", "1.0.0").dependency("b", "^1.0.0").build(),
        ])
        .unwrap()
    }

    #[test]
    fn test_unknown_package_is_dropped() {
        let graph = chain();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[ChangeDescriptor::new("ghost", ChangeType::Major)])
            .unwrap();
        assert!(requests.is_empty());
    }

    #[test]
    fn test_merge_takes_maximum() {
        let graph = chain();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("a", ChangeType::Patch),
                ChangeDescriptor::new("a", ChangeType::Minor),
                ChangeDescriptor::new("a", ChangeType::Patch),
            ])
            .unwrap();
        let a = requests.get("a").unwrap();
        assert_eq!(a.change_type, ChangeType::Minor);
        assert_eq!(a.new_version, v("1.1.0"));
        assert_eq!(a.new_range, ">=1.1.0 <2.0.0");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let graph = chain();
        let registry = PolicyRegistry::default();
        let resolver = ChangeResolver::new(&graph, &registry);
        let forward = resolver
            .resolve(&[
                ChangeDescriptor::new("c", ChangeType::Major),
                ChangeDescriptor::new("c", ChangeType::Patch),
            ])
            .unwrap();
        let backward = resolver
            .resolve(&[
                ChangeDescriptor::new("c", ChangeType::Patch),
                ChangeDescriptor::new("c", ChangeType::Major),
            ])
            .unwrap();
        assert_eq!(forward.get("c").unwrap().new_version, v("2.0.0"));
        assert_eq!(backward.get("c").unwrap().new_version, v("2.0.0"));
    }

    #[test]
    fn test_unpublished_package_is_frozen() {
        let graph = ProjectGraph::new([Project::builder("tool", "0.3.0")
            .should_publish(false)
            .build()])
        .unwrap();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[ChangeDescriptor::new("tool", ChangeType::Major)])
            .unwrap();
        let tool = requests.get("tool").unwrap();
        assert_eq!(tool.change_type, ChangeType::None);
        assert_eq!(tool.new_version, v("0.3.0"));
    }

    #[test]
    fn test_next_bump_policy_is_not_moved_by_members() {
        let graph = ProjectGraph::new([
            Project::builder("h", "1.0.0").version_policy("lock").build(),
            Project::builder("i", "1.0.0").version_policy("lock").build(),
        ])
        .unwrap();
        let registry = PolicyRegistry::new([LockStepPolicy::new("lock", v("1.0.0"))
            .with_next_bump(crate::policy::BumpType::Minor)
            .into()])
        .unwrap();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[ChangeDescriptor::new("h", ChangeType::Patch)])
            .unwrap();
        assert!(requests.policy_change("lock").is_none());
        assert!(!requests.contains("i"));
    }

    #[test]
    fn test_unknown_policy_is_an_error() {
        let graph = ProjectGraph::new([Project::builder("h", "1.0.0")
            .version_policy("missing")
            .build()])
        .unwrap();
        let registry = PolicyRegistry::default();
        let err = ChangeResolver::new(&graph, &registry)
            .resolve(&[ChangeDescriptor::new("h", ChangeType::Patch)])
            .unwrap_err();
        assert!(matches!(err, Error::PolicyNotFound { name } if name == "missing"));
    }

    #[test]
    fn test_sorted_breaks_ties_by_name() {
        let graph = ProjectGraph::new([
            Project::builder("z", "1.0.0").build(),
            Project::builder("m", "1.0.0").build(),
        ])
        .unwrap();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("z", ChangeType::Patch),
                ChangeDescriptor::new("m", ChangeType::Patch),
            ])
            .unwrap();
        let names: Vec<&str> = requests
            .sorted()
            .iter()
            .map(|c| c.package_name.as_str())
            .collect();
        assert_eq!(names, ["m", "z"]);
    }

    #[test]
    fn test_contributing_descriptors_are_kept() {
        let graph = chain();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("c", ChangeType::Patch).with_comment("fix one"),
                ChangeDescriptor::new("c", ChangeType::Patch).with_comment("fix two"),
            ])
            .unwrap();
        let comments: Vec<_> = requests
            .get("c")
            .unwrap()
            .changes
            .iter()
            .filter_map(|d| d.comment.as_deref())
            .collect();
        assert_eq!(comments, ["fix one", "fix two"]);
    }

    #[test]
    fn test_identical_authored_descriptors_are_not_merged() {
        let graph = chain();
        let registry = PolicyRegistry::default();
        let fix = ChangeDescriptor::new("c", ChangeType::Patch).with_comment("Fix parser");
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[fix.clone(), fix])
            .unwrap();

        assert_eq!(requests.get("c").unwrap().changes.len(), 2);
        // Generated dependency descriptors are recorded once however many
        // rounds revisit the consumer.
        assert_eq!(requests.get("b").unwrap().changes.len(), 1);
        assert_eq!(requests.get("a").unwrap().changes.len(), 1);
    }
}
