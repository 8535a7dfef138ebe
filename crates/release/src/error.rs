//! Error types for release operations.

use crate::change::ChangeType;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, writing or publishing changes.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A hotfix and an ordinary release change target the same package.
    #[error(
        "Cannot apply {incoming} change to '{package}' alongside its {existing} change: hotfix changes cannot be combined with patch, minor or major changes"
    )]
    #[diagnostic(
        code(cascade::release::hotfix_conflict),
        help("Publish the hotfix on its own, or remove the hotfix change file before releasing")
    )]
    HotfixConflict {
        /// The package with conflicting changes.
        package: String,
        /// The change type already recorded for the package.
        existing: ChangeType,
        /// The change type that could not be merged.
        incoming: ChangeType,
    },

    /// A hotfix change was requested while hotfixes are disabled.
    #[error("Cannot add hotfix change for '{package}'; hotfixChangeEnabled is false in configuration")]
    #[diagnostic(
        code(cascade::release::hotfix_disabled),
        help("Set \"hotfixChangeEnabled\": true in cascade.json to allow hotfix changes")
    )]
    HotfixDisabled {
        /// The package the hotfix targeted.
        package: String,
    },

    /// A change file declares an unknown change type.
    #[error("Invalid change type \"{value}\" in {}", path.display())]
    #[diagnostic(
        code(cascade::release::invalid_change_type),
        help("Change types are: none, dependency, hotfix, patch, minor, major")
    )]
    InvalidChangeType {
        /// The unrecognized value.
        value: String,
        /// The change file that declared it.
        path: PathBuf,
    },

    /// A trusted caller produced an invalid value.
    #[error("Internal error: {message}")]
    #[diagnostic(code(cascade::release::internal))]
    Internal {
        /// What went wrong.
        message: String,
    },

    /// A change file names a package that is not in the workspace.
    #[error("Change file {} references unknown package '{package}'", path.display())]
    #[diagnostic(
        code(cascade::release::unknown_package),
        help("Fix the packageName in the change file or delete it")
    )]
    UnknownPackage {
        /// The unknown package name.
        package: String,
        /// The change file referencing it.
        path: PathBuf,
    },

    /// A version policy name is not registered.
    #[error("Version policy '{name}' does not exist")]
    #[diagnostic(
        code(cascade::release::policy_not_found),
        help("Check the versionPolicyName in cascade.json against the version policies file")
    )]
    PolicyNotFound {
        /// The missing policy name.
        name: String,
    },

    /// A lockstep-only operation targeted an individual policy.
    #[error("Version policy '{name}' is not a lockstep policy")]
    #[diagnostic(code(cascade::release::not_lockstep))]
    NotLockstep {
        /// The policy name.
        name: String,
    },

    /// A project version is above its lockstep policy version.
    #[error("Version {version} in package {package} is higher than locked version {locked}")]
    #[diagnostic(
        code(cascade::release::version_above_lock),
        help("Use --force to move the package back to the policy version")
    )]
    VersionAboveLock {
        /// The package name.
        package: String,
        /// The package's version.
        version: String,
        /// The policy version.
        locked: String,
    },

    /// A project major version is above its individual policy's locked major.
    #[error(
        "Version {version} in package {package} is higher than locked major version {locked_major}"
    )]
    #[diagnostic(
        code(cascade::release::version_above_locked_major),
        help("Raise lockedMajor in the version policy or lower the package version")
    )]
    VersionAboveLockedMajor {
        /// The package name.
        package: String,
        /// The package's version.
        version: String,
        /// The locked major version.
        locked_major: u64,
    },

    /// A version does not satisfy its policy.
    #[error("Invalid version {version} in {package} for version policy '{policy}'")]
    #[diagnostic(
        code(cascade::release::invalid_policy_version),
        help("Run `cascade version ensure` to align package versions with their policies")
    )]
    InvalidPolicyVersion {
        /// The offending version.
        version: String,
        /// The package name.
        package: String,
        /// The policy name.
        policy: String,
    },

    /// Failed to parse or produce a version string.
    #[error("Invalid version: {version}")]
    #[diagnostic(
        code(cascade::release::invalid_version),
        help("Version must follow semantic versioning (e.g., 1.0.0, 2.1.0-beta.1)")
    )]
    InvalidVersion {
        /// The invalid version string.
        version: String,
    },

    /// Failed to read, write or delete a change file.
    #[error("Change file I/O error: {message}")]
    #[diagnostic(
        code(cascade::release::change_file_io),
        help("Check that the changes folder exists and is writable")
    )]
    ChangeFileIo {
        /// The error message.
        message: String,
        /// The path that caused the error.
        path: Option<PathBuf>,
        /// The underlying source error.
        #[source]
        source: Option<std::io::Error>,
    },

    /// A change file is not valid JSON or does not match the schema.
    #[error("Invalid change file {}: {source}", path.display())]
    #[diagnostic(
        code(cascade::release::change_file_parse),
        help("Change files must be JSON objects with packageName and a changes array")
    )]
    ChangeFileParse {
        /// The path to the invalid file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error.
    #[error("Release configuration error: {message}")]
    #[diagnostic(code(cascade::release::config), help("{help}"))]
    Config {
        /// The error message.
        message: String,
        /// Help text for the user.
        help: String,
    },

    /// Publish error.
    #[error("Publish failed: {message}")]
    #[diagnostic(code(cascade::release::publish))]
    Publish {
        /// The error message.
        message: String,
        /// The package that failed to publish.
        package: Option<String>,
    },

    /// Project graph error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Workspace(#[from] cascade_workspace::Error),

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(cascade::release::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(cascade::release::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a change file I/O error.
    #[must_use]
    pub fn change_file_io(
        message: impl Into<String>,
        path: Option<PathBuf>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::ChangeFileIo {
            message: message.into(),
            path,
            source,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid version error.
    #[must_use]
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create a publish error.
    #[must_use]
    pub fn publish(message: impl Into<String>, package: Option<String>) -> Self {
        Self::Publish {
            message: message.into(),
            package,
        }
    }
}
