//! `cascade publish`: apply pending changes and publish in dependency order.

use super::{ReleaseContext, to_json};
use crate::cli::CliError;
use cascade_release::{
    ChangeFileStore, ChangeResolver, ChangelogRenderer, ChangelogRequest, DryRun, LogTarget,
    PackageWriter, PrereleaseToken, PublishPlan, changelog_requests, collect_descriptors,
    render_all,
};
use serde::Serialize;
use std::fmt::Write;
use tracing::info;

/// Options of the `publish` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Prerelease name.
    pub prerelease_name: Option<String>,
    /// Version suffix.
    pub suffix: Option<String>,
    /// Partial prerelease.
    pub partial: bool,
    /// Overrides the configured tag separator.
    pub tag_separator: Option<String>,
    /// Report only.
    pub dry_run: DryRun,
}

/// Changelog renderer that writes entries to the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    /// `<package> <version>` for every rendered entry.
    pub rendered: Vec<String>,
}

impl ChangelogRenderer for LogRenderer {
    fn render(&mut self, request: &ChangelogRequest, dry_run: DryRun) -> cascade_release::Result<()> {
        for (change_type, comments) in &request.comments {
            for comment in comments {
                info!(
                    mode = dry_run.label(),
                    package = %request.package_name,
                    %change_type,
                    comment = %comment.comment,
                    "Changelog comment"
                );
            }
        }
        self.rendered
            .push(format!("{} {}", request.package_name, request.new_version));
        Ok(())
    }
}

/// Publish output for JSON mode
#[derive(Debug, Serialize)]
pub struct PublishOutput {
    /// Whether nothing was written
    pub dry_run: bool,
    /// Dist-tag used for every package
    pub dist_tag: Option<String>,
    /// Published packages in order
    pub packages: Vec<PublishedPackage>,
    /// Packages whose changelog was updated
    pub changelogs: Vec<String>,
    /// Change files consumed
    pub change_files: usize,
}

/// One published package
#[derive(Debug, Serialize)]
pub struct PublishedPackage {
    /// Package name
    pub name: String,
    /// Published version
    pub version: String,
    /// Release tag
    pub tag: String,
}

/// Execute the `publish` command.
///
/// Resolves pending change files, writes manifests, advances lockstep
/// policies, renders changelog entries, publishes through the log target
/// and deletes the consumed change files. Under a prerelease name or suffix
/// the policies and change files are left alone.
///
/// # Errors
///
/// Returns an error if the prerelease options conflict, or from any step of
/// the release.
pub async fn execute_publish(
    path: &str,
    options: &PublishOptions,
    json: bool,
) -> Result<String, CliError> {
    let token = PrereleaseToken::new(
        options.prerelease_name.clone(),
        options.suffix.clone(),
        options.partial,
    )?;
    let dry_run = options.dry_run;
    let mut context = ReleaseContext::load(path)?;
    let separator = options
        .tag_separator
        .clone()
        .unwrap_or_else(|| context.config.git_tag_separator.clone());
    if separator.is_empty() {
        return Err(CliError::config("Tag separator must not be empty"));
    }

    let graph = context.workspace.graph();
    let files = context.store.load().await?;
    ChangeFileStore::validate(&files, graph)?;
    let descriptors = collect_descriptors(&files)?;
    if descriptors.is_empty() {
        return Ok("No pending changes to publish.".to_string());
    }

    let excluded = context.registry.manually_versioned_projects(graph);
    let mut requests = ChangeResolver::new(graph, &context.registry)
        .with_prerelease(token.clone())
        .with_excluded(excluded.clone())
        .with_hotfix_enabled(context.config.hotfix_change_enabled)
        .resolve(&descriptors)?;

    let writer = PackageWriter::new(graph)
        .with_prerelease(token.clone())
        .with_excluded(excluded);
    let mut outcome = writer.apply(&mut requests, dry_run)?;
    writer.apply_policy_formats(&context.registry, &mut outcome.manifests)?;
    PackageWriter::save(&context.workspace, &outcome.manifests, dry_run)?;

    if !token.has_value() {
        let mut moved = false;
        for change in requests.policy_changes() {
            moved |= context
                .registry
                .update(&change.policy_name, change.new_version.clone())?;
        }
        if moved {
            context.registry.save(&context.policies_path(), dry_run)?;
        }
    }

    let entries = changelog_requests(&requests, graph, &context.registry, &token, &separator)?;
    let mut renderer = LogRenderer::default();
    render_all(&entries, &mut renderer, dry_run)?;

    let plan = PublishPlan::from_changes(&requests, graph, &token, &separator)?;
    plan.execute(&LogTarget, dry_run).await?;
    // Prerelease and suffix releases leave change files for the final release.
    let deleted = if token.has_value() {
        0
    } else {
        context.store.delete(&files, dry_run).await?
    };

    let output = PublishOutput {
        dry_run: dry_run.is_dry_run(),
        dist_tag: plan.dist_tag().map(String::from),
        packages: plan
            .steps()
            .iter()
            .map(|step| PublishedPackage {
                name: step.package_name.clone(),
                version: step.version.to_string(),
                tag: step.tag.clone(),
            })
            .collect(),
        changelogs: renderer.rendered,
        change_files: deleted,
    };
    if json {
        return to_json(output);
    }

    let mut text = String::new();
    let verb = if output.dry_run { "Would publish" } else { "Published" };
    let _ = writeln!(text, "{verb} {} package(s):\n", output.packages.len());
    for package in &output.packages {
        let _ = writeln!(text, "  {} {} ({})", package.name, package.version, package.tag);
    }
    if let Some(tag) = &output.dist_tag {
        let _ = writeln!(text, "\nDist-tag: {tag}");
    }
    let _ = write!(
        text,
        "\nChangelog entries: {}\nChange files consumed: {}",
        output.changelogs.len(),
        output.change_files
    );
    Ok(text)
}
