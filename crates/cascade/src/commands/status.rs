//! `cascade status`: the release pending change files would produce.

use super::{ReleaseContext, to_json};
use crate::cli::CliError;
use cascade_release::{ChangeFileStore, ChangeRequests, ChangeResolver, collect_descriptors};
use serde::Serialize;
use std::fmt::Write;

/// Status output for JSON mode
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    /// Number of pending change files
    pub change_files: usize,
    /// Packages in publish order
    pub packages: Vec<PackageStatus>,
    /// Pending lockstep policy versions
    pub policies: Vec<PolicyStatus>,
}

/// One package of the pending release
#[derive(Debug, Serialize)]
pub struct PackageStatus {
    /// Package name
    pub name: String,
    /// Current version
    pub current: String,
    /// Version after the release
    pub next: String,
    /// Change magnitude
    pub change_type: String,
    /// Publish order
    pub order: usize,
}

/// A pending lockstep policy version
#[derive(Debug, Serialize)]
pub struct PolicyStatus {
    /// Policy name
    pub name: String,
    /// Version after the release
    pub next: String,
}

fn summarize(context: &ReleaseContext, files: usize, requests: &ChangeRequests) -> StatusOutput {
    let graph = context.workspace.graph();
    StatusOutput {
        change_files: files,
        packages: requests
            .sorted()
            .into_iter()
            .map(|change| PackageStatus {
                name: change.package_name.clone(),
                current: graph
                    .get(&change.package_name)
                    .map(|p| p.version().to_string())
                    .unwrap_or_default(),
                next: change.new_version.to_string(),
                change_type: change.change_type.to_string(),
                order: change.order,
            })
            .collect(),
        policies: requests
            .policy_changes()
            .map(|policy| PolicyStatus {
                name: policy.policy_name.clone(),
                next: policy.new_version.to_string(),
            })
            .collect(),
    }
}

/// Execute the `status` command.
///
/// # Errors
///
/// Returns an error if the workspace or change files cannot be loaded or
/// the changes cannot be resolved.
pub async fn execute_status(path: &str, json: bool) -> Result<String, CliError> {
    let context = ReleaseContext::load(path)?;
    let graph = context.workspace.graph();
    let files = context.store.load().await?;
    ChangeFileStore::validate(&files, graph)?;
    let descriptors = collect_descriptors(&files)?;

    let requests = ChangeResolver::new(graph, &context.registry)
        .with_excluded(context.registry.manually_versioned_projects(graph))
        .with_hotfix_enabled(context.config.hotfix_change_enabled)
        .resolve(&descriptors)?;
    let status = summarize(&context, files.len(), &requests);

    if json {
        return to_json(status);
    }

    if status.packages.is_empty() {
        return Ok(
            "No pending changes found.\n\nRun 'cascade change add' to record one.".to_string(),
        );
    }

    let mut output = String::new();
    let _ = writeln!(
        output,
        "Found {} change file(s); {} package(s) in the release:\n",
        status.change_files,
        status.packages.len()
    );
    for package in &status.packages {
        let _ = writeln!(
            output,
            "  {} {} -> {} ({})",
            package.name, package.current, package.next, package.change_type
        );
    }
    if !status.policies.is_empty() {
        output.push_str("\nLockstep policies:\n\n");
        for policy in &status.policies {
            let _ = writeln!(output, "  {} -> {}", policy.name, policy.next);
        }
    }
    Ok(output)
}
