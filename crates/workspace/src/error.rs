//! Error types for project graph operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for project graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading or querying the project graph.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A project was looked up by a name the workspace does not contain.
    #[error("Project '{name}' is not part of the workspace")]
    #[diagnostic(
        code(cascade::workspace::project_not_found),
        help("Check the package name against the projects listed in cascade.json")
    )]
    ProjectNotFound {
        /// The package name that was requested.
        name: String,
    },

    /// Two projects declare the same package name.
    #[error("Project '{name}' is declared more than once")]
    #[diagnostic(
        code(cascade::workspace::duplicate_project),
        help("Every project in the workspace must have a unique package name")
    )]
    DuplicateProject {
        /// The duplicated package name.
        name: String,
    },

    /// Local dependencies form a cycle that was not decoupled.
    #[error("Cyclic dependency between projects: {}", projects.join(" -> "))]
    #[diagnostic(
        code(cascade::workspace::cycle_detected),
        help(
            "Break the cycle or list one of the edges under decoupledLocalDependencies for the consuming project"
        )
    )]
    CycleDetected {
        /// The projects participating in the cycle.
        projects: Vec<String>,
    },

    /// A manifest version is not valid semver.
    #[error("Invalid version '{version}' in project '{project}'")]
    #[diagnostic(
        code(cascade::workspace::invalid_version),
        help("Manifest versions must follow semantic versioning (e.g., 1.0.0, 2.1.0-beta.1)")
    )]
    InvalidVersion {
        /// The project carrying the version.
        project: String,
        /// The version string that failed to parse.
        version: String,
    },

    /// The workspace configuration is invalid.
    #[error("Invalid workspace configuration at {path}: {message}")]
    #[diagnostic(
        code(cascade::workspace::invalid_config),
        help("Check cascade.json for missing projects or mismatched package names")
    )]
    InvalidWorkspaceConfig {
        /// Path to the invalid configuration file.
        path: PathBuf,
        /// Description of what is invalid.
        message: String,
    },

    /// A project folder has no package manifest.
    #[error("Manifest file not found at path: {path}")]
    #[diagnostic(
        code(cascade::workspace::manifest_not_found),
        help("Each projectFolder listed in cascade.json must contain a package.json")
    )]
    ManifestNotFound {
        /// The path where the manifest was expected.
        path: PathBuf,
    },

    /// I/O error occurred.
    #[error("I/O error during {operation}{}: {source}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(cascade::workspace::io_error),
        help("Check that the referenced paths exist and that you have permission to read or write them")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Optional path where the error occurred.
        path: Option<PathBuf>,
        /// Description of the operation being performed.
        operation: String,
    },

    /// JSON parsing error.
    #[error("JSON parsing error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(cascade::workspace::json_error),
        help("Ensure the JSON has valid syntax and matches the expected schema")
    )]
    Json {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },
}

impl Error {
    /// Creates a project-not-found error.
    #[must_use]
    pub fn project_not_found(name: impl Into<String>) -> Self {
        Self::ProjectNotFound { name: name.into() }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidWorkspaceConfig {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "file operation".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source, path: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_lists_members() {
        let err = Error::CycleDetected {
            projects: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic dependency between projects: a -> b");
    }

    #[test]
    fn test_io_display_includes_path() {
        let err = Error::Io {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            path: Some(PathBuf::from("/tmp/x/package.json")),
            operation: "reading manifest".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("reading manifest"));
        assert!(msg.contains("/tmp/x/package.json"));
    }

    #[test]
    fn test_from_io_error() {
        let err: Error = std::io::Error::other("boom").into();
        assert!(matches!(err, Error::Io { path: None, .. }));
    }
}
