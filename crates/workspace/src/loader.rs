//! Workspace loading from `cascade.json`.
//!
//! The configuration lists every project explicitly:
//!
//! ```json
//! {
//!   "projects": [
//!     { "packageName": "@acme/core", "projectFolder": "libraries/core", "shouldPublish": true },
//!     { "packageName": "@acme/app", "projectFolder": "apps/app", "versionPolicyName": "main" }
//!   ]
//! }
//! ```
//!
//! Other top-level keys belong to the release configuration and are ignored here.

use crate::error::{Error, Result};
use crate::graph::ProjectGraph;
use crate::manifest::{MANIFEST_FILE, PackageManifest};
use crate::project::Project;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the workspace configuration file.
pub const CONFIG_FILE: &str = "cascade.json";

/// One entry of the `projects` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    /// Package name; must match the manifest.
    pub package_name: String,
    /// Folder relative to the workspace root.
    pub project_folder: PathBuf,
    /// Whether the project publishes.
    #[serde(default)]
    pub should_publish: bool,
    /// Assigned version policy.
    #[serde(default)]
    pub version_policy_name: Option<String>,
    /// Local dependencies excluded from cycle detection.
    #[serde(default)]
    pub decoupled_local_dependencies: Vec<String>,
}

/// The project list of `cascade.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Projects in the workspace.
    pub projects: Vec<ProjectEntry>,
}

/// A loaded workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    graph: ProjectGraph,
}

impl Workspace {
    /// Loads `cascade.json` from `root` along with every project manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or a manifest cannot be read,
    /// a manifest name disagrees with its entry, or the graph is invalid.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        let config: WorkspaceConfig = read_json_file(&config_path)?;

        let mut projects = Vec::with_capacity(config.projects.len());
        for entry in config.projects {
            let folder = root.join(&entry.project_folder);
            let manifest = PackageManifest::read(&folder.join(MANIFEST_FILE))?;
            if manifest.name != entry.package_name {
                return Err(Error::invalid_config(
                    &config_path,
                    format!(
                        "project folder '{}' contains package '{}' but is listed as '{}'",
                        entry.project_folder.display(),
                        manifest.name,
                        entry.package_name
                    ),
                ));
            }
            debug!(package = %entry.package_name, folder = %folder.display(), "Loaded project");
            projects.push(
                Project::new(manifest, folder)
                    .with_publish_flag(entry.should_publish)
                    .with_version_policy(entry.version_policy_name)
                    .with_decoupled(entry.decoupled_local_dependencies),
            );
        }

        Ok(Self {
            root: root.to_path_buf(),
            graph: ProjectGraph::new(projects)?,
        })
    }

    /// Wraps an already-built graph.
    #[must_use]
    pub fn from_graph(root: impl Into<PathBuf>, graph: ProjectGraph) -> Self {
        Self {
            root: root.into(),
            graph,
        }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project graph.
    #[must_use]
    pub const fn graph(&self) -> &ProjectGraph {
        &self.graph
    }

    /// Path of a project's manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotFound`] for unknown names.
    pub fn manifest_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.graph.project(name)?.folder().join(MANIFEST_FILE))
    }
}

/// Reads and parses a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed as valid JSON.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::Io {
        source: e,
        path: Some(path.to_path_buf()),
        operation: "reading json file".to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| Error::Json {
        source: e,
        path: Some(path.to_path_buf()),
    })
}
