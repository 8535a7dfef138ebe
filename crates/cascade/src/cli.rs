//! Argument parsing, CLI errors and exit codes.

use crate::commands::Command;
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;

/// Successful exit code
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Release engine error exit code
pub const EXIT_RELEASE: i32 = 3;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Invalid arguments or workspace configuration (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(cascade::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Error raised by the release engine
    #[error(transparent)]
    #[diagnostic(transparent)]
    Release(#[from] cascade_release::Error),
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(cascade::cli::other))]
    Other {
        /// The error message
        message: String,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Short machine-readable category for JSON output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Release(_) => "release",
            Self::Other { .. } => "other",
        }
    }
}

impl From<cascade_workspace::Error> for CliError {
    fn from(err: cascade_workspace::Error) -> Self {
        Self::Release(err.into())
    }
}

/// Map CLI error to exit code.
///
/// Release errors caused by user-authored input (configuration, policies,
/// change files) count as configuration errors.
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    use cascade_release::Error as E;
    match err {
        CliError::Config { .. }
        | CliError::Release(
            E::Config { .. }
            | E::PolicyNotFound { .. }
            | E::NotLockstep { .. }
            | E::VersionAboveLock { .. }
            | E::VersionAboveLockedMajor { .. }
            | E::InvalidPolicyVersion { .. }
            | E::HotfixDisabled { .. }
            | E::InvalidChangeType { .. }
            | E::ChangeFileParse { .. }
            | E::UnknownPackage { .. }
            | E::Workspace(_),
        ) => EXIT_CLI,
        CliError::Release(_) | CliError::Other { .. } => EXIT_RELEASE,
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.code(),
            "message": err.to_string()
        }));
        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err);
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Monorepo release engine: change files, version policies and publishing.
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(about = "Propagate changes, bump versions and publish packages of a monorepo")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Log line format.
    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: crate::tracing::TracingFormat,

    /// Emit JSON logs and a JSON result envelope.
    #[arg(long, global = true, help = "Output logs and results in JSON format")]
    pub json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the release that pending change files would produce.
    #[command(about = "Show the release that pending change files would produce")]
    Status {
        /// Path to workspace root.
        #[arg(long, short = 'p', help = "Path to workspace root", default_value = ".")]
        path: String,
    },
    /// Change file operations.
    #[command(about = "Change file operations")]
    Change {
        /// Change subcommand to execute.
        #[command(subcommand)]
        subcommand: ChangeCommands,
    },
    /// Version policy operations.
    #[command(about = "Version policy operations")]
    Version {
        /// Version subcommand to execute.
        #[command(subcommand)]
        subcommand: VersionCommands,
    },
    /// Apply pending changes and publish in dependency order.
    #[command(about = "Apply pending changes and publish in dependency order")]
    Publish {
        /// Path to workspace root.
        #[arg(long, short = 'p', help = "Path to workspace root", default_value = ".")]
        path: String,
        /// Prerelease name appended to every changed version.
        #[arg(long, help = "Prerelease name appended to every changed version")]
        prerelease_name: Option<String>,
        /// Suffix appended to every published version.
        #[arg(long, help = "Suffix appended to every published version", conflicts_with = "prerelease_name")]
        suffix: Option<String>,
        /// Only prerelease packages with a patch or larger change.
        #[arg(long, help = "Only prerelease packages with a patch or larger change", requires = "prerelease_name")]
        partial: bool,
        /// Git tag separator override.
        #[arg(long, help = "Separator between package name and version in tags")]
        tag_separator: Option<String>,
        /// Show what would be published without writing anything.
        #[arg(long, help = "Show what would be published without writing anything")]
        dry_run: bool,
    },
}

/// Change file subcommands.
#[derive(Subcommand, Debug)]
pub enum ChangeCommands {
    /// Record a change for a package.
    #[command(about = "Record a change for a package")]
    Add {
        /// Path to workspace root.
        #[arg(long, short = 'p', help = "Path to workspace root", default_value = ".")]
        path: String,
        /// Package the change applies to.
        #[arg(long = "package", short = 'P', help = "Package the change applies to")]
        package: String,
        /// Change type.
        #[arg(
            long = "type",
            short = 't',
            help = "Change type (none, dependency, hotfix, patch, minor, major)"
        )]
        change_type: String,
        /// Changelog comment.
        #[arg(long, short = 'm', help = "Changelog comment")]
        comment: Option<String>,
        /// Author email recorded in the change file.
        #[arg(long, env = "CASCADE_EMAIL", help = "Author email recorded in the change file")]
        email: Option<String>,
        /// Show the file that would be written.
        #[arg(long, help = "Show the file that would be written")]
        dry_run: bool,
    },
}

/// Version policy subcommands.
#[derive(Subcommand, Debug)]
pub enum VersionCommands {
    /// Bring project versions in line with their policies.
    #[command(about = "Bring project versions in line with their policies")]
    Ensure {
        /// Path to workspace root.
        #[arg(long, short = 'p', help = "Path to workspace root", default_value = ".")]
        path: String,
        /// Only this policy.
        #[arg(long, help = "Only ensure this policy")]
        policy: Option<String>,
        /// Overwrite versions above a lockstep version.
        #[arg(long, help = "Overwrite versions above a lockstep version")]
        force: bool,
        /// Author email recorded in generated change files.
        #[arg(long, env = "CASCADE_EMAIL", help = "Author email recorded in generated change files")]
        email: Option<String>,
        /// Show what would change without writing.
        #[arg(long, help = "Show what would change without writing")]
        dry_run: bool,
    },
    /// Bump version policies and apply pending changes.
    #[command(about = "Bump version policies and apply pending changes")]
    Bump {
        /// Path to workspace root.
        #[arg(long, short = 'p', help = "Path to workspace root", default_value = ".")]
        path: String,
        /// Only this policy.
        #[arg(long, help = "Only bump this policy")]
        policy: Option<String>,
        /// Bump type overriding each policy's next bump.
        #[arg(
            long,
            help = "Bump type (none, prerelease, patch, preminor, minor, major, premajor, prepatch)"
        )]
        bump_type: Option<String>,
        /// Prerelease identifier for pre* bumps.
        #[arg(long, help = "Prerelease identifier for pre* bumps")]
        identifier: Option<String>,
        /// Show what would change without writing.
        #[arg(long, help = "Show what would change without writing")]
        dry_run: bool,
    },
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Status { path } => Self::Status { path },
            Commands::Change { subcommand } => match subcommand {
                ChangeCommands::Add {
                    path,
                    package,
                    change_type,
                    comment,
                    email,
                    dry_run,
                } => Self::ChangeAdd {
                    path,
                    package,
                    change_type,
                    comment,
                    email,
                    dry_run,
                },
            },
            Commands::Version { subcommand } => match subcommand {
                VersionCommands::Ensure {
                    path,
                    policy,
                    force,
                    email,
                    dry_run,
                } => Self::VersionEnsure {
                    path,
                    policy,
                    force,
                    email,
                    dry_run,
                },
                VersionCommands::Bump {
                    path,
                    policy,
                    bump_type,
                    identifier,
                    dry_run,
                } => Self::VersionBump {
                    path,
                    policy,
                    bump_type,
                    identifier,
                    dry_run,
                },
            },
            Commands::Publish {
                path,
                prerelease_name,
                suffix,
                partial,
                tag_separator,
                dry_run,
            } => Self::Publish {
                path,
                prerelease_name,
                suffix,
                partial,
                tag_separator,
                dry_run,
            },
        }
    }
}

/// Parses the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
