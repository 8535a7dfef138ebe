//! `cascade change add`: record a change file.

use super::ReleaseContext;
use crate::cli::CliError;
use cascade_release::{ChangeDescriptor, ChangeFile, ChangeType, DryRun, Error};
use std::fmt::Write;

/// Execute the `change add` command.
///
/// # Errors
///
/// Returns an error if the package is unknown, the change type is invalid,
/// a hotfix is requested while hotfixes are disabled, or the file cannot be
/// written.
pub fn execute_change_add(
    path: &str,
    package: &str,
    change_type: &str,
    comment: Option<&str>,
    email: Option<&str>,
    dry_run: DryRun,
) -> Result<String, CliError> {
    let context = ReleaseContext::load(path)?;
    let project = context.workspace.graph().get(package).ok_or_else(|| {
        CliError::config_with_help(
            format!("Package '{package}' is not part of the workspace"),
            "Check the packageName entries in cascade.json",
        )
    })?;

    let change_type = ChangeType::parse(change_type).ok_or_else(|| {
        CliError::config_with_help(
            format!("Invalid change type '{change_type}'"),
            "Change types are: none, dependency, hotfix, patch, minor, major",
        )
    })?;
    if change_type == ChangeType::Hotfix && !context.config.hotfix_change_enabled {
        return Err(Error::HotfixDisabled {
            package: package.to_string(),
        }
        .into());
    }

    let mut descriptor = ChangeDescriptor::new(project.name(), change_type);
    if let Some(comment) = comment.filter(|c| !c.trim().is_empty()) {
        descriptor = descriptor.with_comment(comment.trim());
    }
    let mut file = ChangeFile::new(project.name());
    file.email = email.map(String::from);
    file.add_change(&descriptor);

    let written = context.store.write(&file, dry_run)?;

    let mut output = String::new();
    let verb = if dry_run.is_dry_run() { "Would create" } else { "Created" };
    let _ = writeln!(output, "{verb} change file: {}", written.display());
    let _ = writeln!(output, "  Package: {}", project.name());
    let _ = write!(output, "  Type: {change_type}");
    if let Some(comment) = &descriptor.comment {
        let _ = write!(output, "\n  Comment: {comment}");
    }
    Ok(output)
}
