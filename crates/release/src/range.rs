//! Dependency range rewriting.
//!
//! When a local package gets a new version, every declaration pointing at it
//! is rewritten in the declaration's own style:
//!
//! | declared            | rewritten for `2.1.0`    |
//! |---------------------|--------------------------|
//! | `^1.0.0`            | `^2.1.0`                 |
//! | `~1.0.0`            | `~2.1.0`                 |
//! | `1.0.0`             | `2.1.0`                  |
//! | `>=1.0.0 <2.0.0`    | `>=2.1.0 <3.0.0`         |
//! | `*`                 | `*`                      |
//! | `workspace:^1.0.0`  | `workspace:^2.1.0`       |
//! | `workspace:*`       | unchanged in [`WriteMode::Commit`], `2.1.0` in [`WriteMode::Publish`] |
//! | `npm:real@^1.0.0`   | `npm:real@^2.1.0`        |

use crate::version::new_range_dependency;
use cascade_workspace::specifier::{ALIAS_PREFIX, WORKSPACE_PREFIX};
use cascade_workspace::{DependencySpecifier, WorkspaceRange};
use regex::Regex;
use semver::Version;
use std::sync::LazyLock;

static RANGE_DEPENDENCY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r">=?(?:\d+\.){2}\d+(?:-[0-9A-Za-z.-]*)?\s+<(?:\d+\.){2}\d+").ok()
});

/// Which manifest is being written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Manifests committed back to the repository. Workspace wildcards are
    /// kept so local linking keeps working.
    #[default]
    Commit,
    /// Manifests about to be packed. The workspace protocol is resolved to a
    /// concrete version.
    Publish,
}

/// Whether `range` has the `>=a.b.c <x.y.z` form.
#[must_use]
pub fn is_range_dependency(range: &str) -> bool {
    RANGE_DEPENDENCY
        .as_ref()
        .is_some_and(|regex| regex.is_match(range))
}

fn rewrite_range(range: &str, version: &Version) -> String {
    let range = range.trim();
    if range == "*" {
        "*".to_string()
    } else if is_range_dependency(range) {
        new_range_dependency(version)
    } else if range.starts_with('~') {
        format!("~{version}")
    } else if range.starts_with('^') {
        format!("^{version}")
    } else {
        version.to_string()
    }
}

/// Rewrites a declaration to accept `version`, keeping its style.
///
/// Tags and non-version specifiers (paths, urls) are returned unchanged.
#[must_use]
pub fn rewrite(declared: &str, version: &Version, mode: WriteMode) -> String {
    match DependencySpecifier::parse(declared) {
        DependencySpecifier::Workspace(range) => match (mode, range) {
            (WriteMode::Commit, WorkspaceRange::Explicit(range)) => {
                format!("{WORKSPACE_PREFIX}{}", rewrite_range(&range, version))
            }
            (WriteMode::Commit, _) => declared.trim().to_string(),
            (WriteMode::Publish, range) => publish_form(&range, version),
        },
        DependencySpecifier::Alias { name, range } => {
            format!("{ALIAS_PREFIX}{name}@{}", rewrite_range(&range, version))
        }
        DependencySpecifier::Version(_) | DependencySpecifier::Range(_) => {
            rewrite_range(declared, version)
        }
        DependencySpecifier::Tag(_) | DependencySpecifier::Other(_) => declared.to_string(),
    }
}

/// The concrete range a workspace declaration publishes as.
#[must_use]
pub fn publish_form(range: &WorkspaceRange, version: &Version) -> String {
    match range {
        WorkspaceRange::Any => version.to_string(),
        WorkspaceRange::Tilde => format!("~{version}"),
        WorkspaceRange::Caret => format!("^{version}"),
        WorkspaceRange::Explicit(range) => rewrite_range(range, version),
    }
}

/// Pins a declaration to exactly `version`, keeping any protocol prefix.
///
/// Used for prerelease and suffix releases where dependents must take the
/// exact prerelease build.
#[must_use]
pub fn pin(declared: &str, version: &str, mode: WriteMode) -> String {
    match DependencySpecifier::parse(declared) {
        DependencySpecifier::Workspace(_) if mode == WriteMode::Commit => {
            format!("{WORKSPACE_PREFIX}{version}")
        }
        DependencySpecifier::Alias { name, .. } => format!("{ALIAS_PREFIX}{name}@{version}"),
        _ => version.to_string(),
    }
}
