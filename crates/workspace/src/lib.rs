//! Project graph for cascade.
//!
//! This crate models the packages of a multi-project workspace and the local
//! dependency edges between them:
//!
//! - [`PackageManifest`] - a `package.json` with typed dependency tables
//! - [`DependencySpecifier`] - dependency values and npm range matching
//! - [`Project`] - one package plus its publish flag, version policy and
//!   decoupled local dependencies
//! - [`ProjectGraph`] - the immutable, eagerly built dependency graph
//! - [`Workspace`] - loading projects from `cascade.json`
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_workspace::{Project, ProjectGraph};
//!
//! let graph = ProjectGraph::new([
//!     Project::builder("lib", "1.0.0").build(),
//!     Project::builder("app", "1.0.0").dependency("lib", "^1.0.0").build(),
//! ])?;
//! assert_eq!(graph.consuming_projects("lib")[0].name(), "app");
//! ```

pub mod error;
pub mod graph;
pub mod loader;
pub mod manifest;
pub mod project;
pub mod specifier;

pub use error::{Error, Result};
pub use graph::ProjectGraph;
pub use loader::{CONFIG_FILE, ProjectEntry, Workspace, WorkspaceConfig, read_json_file};
pub use manifest::{DependencyKind, MANIFEST_FILE, PackageManifest};
pub use project::{DependencyReference, Project, ProjectBuilder};
pub use specifier::{DependencySpecifier, WorkspaceRange, satisfies};
