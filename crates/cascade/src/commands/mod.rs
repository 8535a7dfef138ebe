//! Command implementations.
//!
//! Every command loads a [`ReleaseContext`] from the workspace root, runs one
//! release operation and returns the text (or JSON) to print on stdout.

pub mod change;
pub mod publish;
pub mod status;
pub mod version;

use crate::cli::CliError;
use cascade_release::{ChangeFileStore, DryRun, PolicyRegistry, ReleaseConfig};
use cascade_workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{Instrument, debug};

/// A parsed command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `cascade status`
    Status {
        /// Workspace root.
        path: String,
    },
    /// `cascade change add`
    ChangeAdd {
        /// Workspace root.
        path: String,
        /// Target package.
        package: String,
        /// Change type name.
        change_type: String,
        /// Changelog comment.
        comment: Option<String>,
        /// Author email.
        email: Option<String>,
        /// Report only.
        dry_run: bool,
    },
    /// `cascade version ensure`
    VersionEnsure {
        /// Workspace root.
        path: String,
        /// Only this policy.
        policy: Option<String>,
        /// Move versions down to the lockstep version.
        force: bool,
        /// Email for generated change files.
        email: Option<String>,
        /// Report only.
        dry_run: bool,
    },
    /// `cascade version bump`
    VersionBump {
        /// Workspace root.
        path: String,
        /// Only this policy.
        policy: Option<String>,
        /// Bump type name.
        bump_type: Option<String>,
        /// Prerelease identifier.
        identifier: Option<String>,
        /// Report only.
        dry_run: bool,
    },
    /// `cascade publish`
    Publish {
        /// Workspace root.
        path: String,
        /// Prerelease name.
        prerelease_name: Option<String>,
        /// Version suffix.
        suffix: Option<String>,
        /// Partial prerelease.
        partial: bool,
        /// Tag separator override.
        tag_separator: Option<String>,
        /// Report only.
        dry_run: bool,
    },
}

impl Command {
    /// Name used in spans and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ChangeAdd { .. } => "change add",
            Self::VersionEnsure { .. } => "version ensure",
            Self::VersionBump { .. } => "version bump",
            Self::Publish { .. } => "publish",
        }
    }
}

/// Runs a command and returns its output.
///
/// # Errors
///
/// Returns the first error of the underlying release operation.
pub async fn execute(command: Command, json: bool) -> Result<String, CliError> {
    let span = crate::command_span!(command.name());
    async move {
        match command {
            Command::Status { path } => status::execute_status(&path, json).await,
            Command::ChangeAdd {
                path,
                package,
                change_type,
                comment,
                email,
                dry_run,
            } => change::execute_change_add(
                &path,
                &package,
                &change_type,
                comment.as_deref(),
                email.as_deref(),
                DryRun::from(dry_run),
            ),
            Command::VersionEnsure {
                path,
                policy,
                force,
                email,
                dry_run,
            } => version::execute_version_ensure(
                &path,
                policy.as_deref(),
                force,
                email.as_deref(),
                DryRun::from(dry_run),
                json,
            ),
            Command::VersionBump {
                path,
                policy,
                bump_type,
                identifier,
                dry_run,
            } => {
                version::execute_version_bump(
                    &path,
                    policy.as_deref(),
                    bump_type.as_deref(),
                    identifier.as_deref(),
                    DryRun::from(dry_run),
                    json,
                )
                .await
            }
            Command::Publish {
                path,
                prerelease_name,
                suffix,
                partial,
                tag_separator,
                dry_run,
            } => {
                let options = publish::PublishOptions {
                    prerelease_name,
                    suffix,
                    partial,
                    tag_separator,
                    dry_run: DryRun::from(dry_run),
                };
                publish::execute_publish(&path, &options, json).await
            }
        }
    }
    .instrument(span)
    .await
}

/// Everything loaded from a workspace root.
#[derive(Debug)]
pub struct ReleaseContext {
    /// Workspace root.
    pub root: PathBuf,
    /// Release settings.
    pub config: ReleaseConfig,
    /// Projects and their graph.
    pub workspace: Workspace,
    /// Version policies.
    pub registry: PolicyRegistry,
    /// Change files folder.
    pub store: ChangeFileStore,
}

impl ReleaseContext {
    /// Loads configuration, projects and policies under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if any file is missing or invalid, or a policy
    /// member's version does not satisfy its policy.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, CliError> {
        let root = root.as_ref().to_path_buf();
        let config = ReleaseConfig::load(&root)?;
        let workspace = Workspace::load(&root)?;
        let registry = PolicyRegistry::load(&config.policies_path(&root))?;
        let store = ChangeFileStore::new(config.changes_path(&root));
        debug!(
            root = %root.display(),
            projects = workspace.graph().len(),
            policies = registry.policies().count(),
            "Loaded release context"
        );
        Ok(Self {
            root,
            config,
            workspace,
            registry,
            store,
        })
    }

    /// Path of the version policies file.
    #[must_use]
    pub fn policies_path(&self) -> PathBuf {
        self.config.policies_path(&self.root)
    }
}

/// Serializes a JSON result envelope.
pub(crate) fn to_json<T: serde::Serialize>(data: T) -> Result<String, CliError> {
    serde_json::to_string_pretty(&crate::cli::OkEnvelope::new(data))
        .map_err(|e| CliError::other(format!("JSON serialization failed: {e}")))
}
