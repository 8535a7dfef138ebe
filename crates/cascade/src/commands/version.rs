//! `cascade version ensure` and `cascade version bump`.

use super::publish::LogRenderer;
use super::{ReleaseContext, to_json};
use crate::cli::CliError;
use cascade_release::{
    BumpType, ChangeFileStore, DryRun, PackageWriter, PrereleaseToken, VersionManager,
    changelog_requests, collect_descriptors, render_all,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Version command output for JSON mode
#[derive(Debug, Serialize)]
pub struct VersionOutput {
    /// Whether nothing was written
    pub dry_run: bool,
    /// New version per updated package
    pub versions: BTreeMap<String, String>,
    /// Change files written or deleted
    pub change_files: usize,
    /// Lockstep policy versions after the command
    pub policies: BTreeMap<String, String>,
}

fn render(output: &VersionOutput, change_files_label: &str) -> String {
    if output.versions.is_empty() {
        return "All project versions already match their policies.".to_string();
    }
    let mut text = String::new();
    let verb = if output.dry_run { "Would update" } else { "Updated" };
    let _ = writeln!(text, "{verb} {} package(s):\n", output.versions.len());
    for (name, version) in &output.versions {
        let _ = writeln!(text, "  {name} -> {version}");
    }
    if !output.policies.is_empty() {
        text.push_str("\nLockstep policies:\n\n");
        for (name, version) in &output.policies {
            let _ = writeln!(text, "  {name}: {version}");
        }
    }
    let _ = write!(text, "\n{change_files_label}: {}", output.change_files);
    text
}

fn lockstep_versions(registry: &cascade_release::PolicyRegistry) -> BTreeMap<String, String> {
    registry
        .policies()
        .filter_map(|policy| {
            policy
                .as_lockstep()
                .map(|lock| (lock.policy_name.clone(), lock.version.to_string()))
        })
        .collect()
}

/// Execute the `version ensure` command.
///
/// Moves policy members to their policy versions, rewrites dependency
/// ranges that no longer accept them, saves the manifests and records a
/// change file for every package with generated changes.
///
/// # Errors
///
/// Returns an error if a policy is unknown, a version is out of bounds for
/// its policy, or a file cannot be written.
pub fn execute_version_ensure(
    path: &str,
    policy: Option<&str>,
    force: bool,
    email: Option<&str>,
    dry_run: DryRun,
    json: bool,
) -> Result<String, CliError> {
    let context = ReleaseContext::load(path)?;
    let manager = VersionManager::new(context.workspace.graph(), context.registry.clone());
    let update = manager.ensure(policy, force)?;

    PackageWriter::save(&context.workspace, &update.manifests, dry_run)?;
    let files = update.change_files(email);
    for file in &files {
        context.store.write(file, dry_run)?;
    }

    let output = VersionOutput {
        dry_run: dry_run.is_dry_run(),
        versions: update
            .manifests
            .iter()
            .map(|(name, manifest)| (name.clone(), manifest.version.clone()))
            .collect(),
        change_files: files.len(),
        policies: lockstep_versions(manager.registry()),
    };
    if json {
        return to_json(output);
    }
    Ok(render(&output, "Change files written"))
}

/// Execute the `version bump` command.
///
/// Bumps lockstep policies, applies pending change files on top, saves
/// manifests and policies, hands changelog entries to the log renderer and
/// deletes the consumed change files.
///
/// # Errors
///
/// Returns an error if the bump type is invalid, or from any step of the
/// release.
pub async fn execute_version_bump(
    path: &str,
    policy: Option<&str>,
    bump_type: Option<&str>,
    identifier: Option<&str>,
    dry_run: DryRun,
    json: bool,
) -> Result<String, CliError> {
    let bump = bump_type
        .map(|name| {
            BumpType::parse(name).ok_or_else(|| {
                CliError::config_with_help(
                    format!("Invalid bump type '{name}'"),
                    "Bump types are: none, prerelease, patch, preminor, minor, major, premajor, prepatch",
                )
            })
        })
        .transpose()?;

    let context = ReleaseContext::load(path)?;
    let graph = context.workspace.graph();
    let files = context.store.load().await?;
    ChangeFileStore::validate(&files, graph)?;
    let descriptors = collect_descriptors(&files)?;

    let mut manager = VersionManager::new(graph, context.registry.clone())
        .with_hotfix_enabled(context.config.hotfix_change_enabled);
    let outcome = manager.bump(policy, bump, identifier, &descriptors, dry_run)?;

    PackageWriter::save(&context.workspace, &outcome.update.manifests, dry_run)?;
    manager.registry().save(&context.policies_path(), dry_run)?;

    let entries = changelog_requests(
        &outcome.requests,
        graph,
        manager.registry(),
        &PrereleaseToken::none(),
        &context.config.git_tag_separator,
    )?;
    let mut renderer = LogRenderer::default();
    render_all(&entries, &mut renderer, dry_run)?;
    let deleted = context.store.delete(&files, dry_run).await?;

    let output = VersionOutput {
        dry_run: dry_run.is_dry_run(),
        versions: outcome
            .update
            .manifests
            .iter()
            .map(|(name, manifest)| (name.clone(), manifest.version.clone()))
            .collect(),
        change_files: deleted,
        policies: lockstep_versions(manager.registry()),
    };
    if json {
        return to_json(output);
    }
    Ok(render(&output, "Change files consumed"))
}
