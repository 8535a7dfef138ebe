//! Changelog requests for external renderers.
//!
//! The engine does not format changelogs. It hands one [`ChangelogRequest`]
//! per package that hosts a changelog to a [`ChangelogRenderer`], which owns
//! the output format and storage.

use crate::DryRun;
use crate::change::{ChangeDescriptor, ChangeType};
use crate::error::Result;
use crate::policy::PolicyRegistry;
use crate::prerelease::PrereleaseToken;
use crate::publish::tag_name;
use crate::resolve::ChangeRequests;
use crate::version::is_prerelease;
use crate::writer::written_version;
use cascade_workspace::ProjectGraph;
use chrono::{DateTime, Utc};
use semver::Version;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// One comment in a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeComment {
    /// The comment text.
    pub comment: String,
    /// Author of the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Commit that introduced the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Fields passed through from the change file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ChangeComment {
    fn from_descriptor(descriptor: &ChangeDescriptor) -> Option<Self> {
        let comment = descriptor.comment.as_deref().filter(|c| !c.is_empty())?;
        Some(Self {
            comment: comment.to_string(),
            author: descriptor.author.clone(),
            commit: descriptor.commit.clone(),
            custom_fields: descriptor.custom_fields.clone(),
        })
    }
}

/// Everything a renderer needs for one package's new changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogRequest {
    /// The package.
    pub package_name: String,
    /// The released version.
    pub new_version: Version,
    /// Overall magnitude of the release.
    pub change_type: ChangeType,
    /// The release tag.
    pub tag: String,
    /// When the request was created.
    pub date: DateTime<Utc>,
    /// Comments grouped by the magnitude of the change that carried them.
    pub comments: BTreeMap<ChangeType, Vec<ChangeComment>>,
}

impl ChangelogRequest {
    /// Total number of comments.
    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.comments.values().map(Vec::len).sum()
    }
}

/// Renders changelog requests into a concrete format.
pub trait ChangelogRenderer {
    /// Renders one request. Under a dry run nothing should be persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be rendered or stored.
    fn render(&mut self, request: &ChangelogRequest, dry_run: DryRun) -> Result<()>;
}

/// Builds the changelog requests for a resolution, in publish order.
///
/// A package gets an entry when it publishes, hosts its policy's changelog,
/// and neither its current nor its written version is a prerelease, unless
/// it is receiving a hotfix. Versions and tags are the ones the writer
/// stamps under `token`.
///
/// # Errors
///
/// Returns an error if a prerelease version cannot be computed.
pub fn changelog_requests(
    requests: &ChangeRequests,
    graph: &ProjectGraph,
    registry: &PolicyRegistry,
    token: &PrereleaseToken,
    tag_separator: &str,
) -> Result<Vec<ChangelogRequest>> {
    let date = Utc::now();
    let mut entries = Vec::new();
    for change in requests.sorted() {
        let Some(project) = graph.get(&change.package_name) else {
            continue;
        };
        let new_version = written_version(change, token)?;
        let on_prerelease = is_prerelease(&new_version)
            || project.parsed_version().is_ok_and(|v| is_prerelease(&v));
        if !project.should_publish()
            || (on_prerelease && change.change_type != ChangeType::Hotfix)
            || !registry.is_main_project(project)
        {
            debug!(package = %change.package_name, "No changelog entry");
            continue;
        }

        let mut comments: BTreeMap<ChangeType, Vec<ChangeComment>> = BTreeMap::new();
        for descriptor in &change.changes {
            if let Some(comment) = ChangeComment::from_descriptor(descriptor) {
                comments.entry(descriptor.change_type).or_default().push(comment);
            }
        }

        entries.push(ChangelogRequest {
            package_name: change.package_name.clone(),
            tag: tag_name(&change.package_name, &new_version, tag_separator),
            new_version,
            change_type: change.change_type,
            date,
            comments,
        });
    }
    Ok(entries)
}

/// Hands every request to `renderer`, stopping at the first failure.
///
/// # Errors
///
/// Returns the renderer's first error.
pub fn render_all(
    requests: &[ChangelogRequest],
    renderer: &mut dyn ChangelogRenderer,
    dry_run: DryRun,
) -> Result<()> {
    for request in requests {
        info!(
            mode = dry_run.label(),
            package = %request.package_name,
            version = %request.new_version,
            comments = request.comment_count(),
            "Changelog update"
        );
        renderer.render(request, dry_run)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LockStepPolicy;
    use crate::resolve::ChangeResolver;
    use cascade_workspace::Project;

    struct Collect(Vec<String>);

    impl ChangelogRenderer for Collect {
        fn render(&mut self, request: &ChangelogRequest, _dry_run: DryRun) -> Result<()> {
            self.0.push(format!("{}@{}", request.package_name, request.new_version));
            Ok(())
        }
    }

    fn graph() -> ProjectGraph {
        ProjectGraph::new([
            Project::builder("lib", "1.0.0").build(),
            Project::builder("app", "1.0.0").dependency("lib", "^1.0.0").build(),
            Project::builder("beta", "2.0.0-beta.1").build(),
            Project::builder("private", "1.0.0").should_publish(false).build(),
        ])
        .unwrap()
    }

    #[test]
    fn test_requests_group_comments() {
        let graph = graph();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("lib", ChangeType::Minor)
                    .with_comment("Add streaming")
                    .with_author("ana"),
                ChangeDescriptor::new("lib", ChangeType::Patch).with_comment("Fix typo"),
                ChangeDescriptor::new("lib", ChangeType::Patch),
            ])
            .unwrap();

        let entries =
            changelog_requests(&requests, &graph, &registry, &PrereleaseToken::none(), "_").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.package_name.as_str()).collect();
        assert_eq!(names, vec!["lib", "app"]);
        let lib = &entries[0];
        assert_eq!(lib.new_version.to_string(), "1.1.0");
        assert_eq!(lib.tag, "lib_v1.1.0");
        assert_eq!(lib.comments[&ChangeType::Minor][0].author.as_deref(), Some("ana"));
        assert_eq!(lib.comments[&ChangeType::Patch].len(), 1);
        assert_eq!(lib.comment_count(), 2);
    }

    #[test]
    fn test_prerelease_and_unpublished_skipped() {
        let graph = graph();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("beta", ChangeType::Minor),
                ChangeDescriptor::new("private", ChangeType::Minor),
            ])
            .unwrap();
        assert!(
            changelog_requests(&requests, &graph, &registry, &PrereleaseToken::none(), "_")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_prerelease_release_has_no_entries() {
        let graph = graph();
        let registry = PolicyRegistry::default();
        let token = PrereleaseToken::prerelease("rc");
        let requests = ChangeResolver::new(&graph, &registry)
            .with_prerelease(token.clone())
            .resolve(&[
                ChangeDescriptor::new("lib", ChangeType::Minor).with_comment("Add streaming"),
            ])
            .unwrap();

        assert!(
            changelog_requests(&requests, &graph, &registry, &token, "_")
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_only_main_project_of_lockstep() {
        let graph = ProjectGraph::new([
            Project::builder("core", "1.0.0").version_policy("lock").build(),
            Project::builder("ui", "1.0.0").version_policy("lock").build(),
        ])
        .unwrap();
        let registry = PolicyRegistry::new([LockStepPolicy::new(
            "lock",
            Version::new(1, 0, 0),
        )
        .with_main_project("core")
        .into()])
        .unwrap();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[
                ChangeDescriptor::new("core", ChangeType::Patch),
                ChangeDescriptor::new("ui", ChangeType::Patch),
            ])
            .unwrap();

        let entries =
            changelog_requests(&requests, &graph, &registry, &PrereleaseToken::none(), "_").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.package_name.as_str()).collect();
        assert_eq!(names, vec!["core"]);
    }

    #[test]
    fn test_render_all_in_order() {
        let graph = graph();
        let registry = PolicyRegistry::default();
        let requests = ChangeResolver::new(&graph, &registry)
            .resolve(&[ChangeDescriptor::new("lib", ChangeType::Major)])
            .unwrap();
        let entries =
            changelog_requests(&requests, &graph, &registry, &PrereleaseToken::none(), "@").unwrap();

        let mut renderer = Collect(Vec::new());
        render_all(&entries, &mut renderer, DryRun::Yes).unwrap();
        assert_eq!(renderer.0, vec!["lib@2.0.0", "app@1.0.1"]);
    }
}
