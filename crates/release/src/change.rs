//! Change descriptors and change file storage.
//!
//! Change files are JSON documents stored under the changes folder, one per
//! package and branch:
//!
//! ```json
//! {
//!   "packageName": "@acme/core",
//!   "email": "dev@acme.io",
//!   "changes": [
//!     { "packageName": "@acme/core", "type": "minor", "comment": "Add streaming API" }
//!   ]
//! }
//! ```
//!
//! Change types stay raw strings in the file model. They are parsed when
//! files are turned into [`ChangeDescriptor`]s, so an unknown type is reported
//! against the file that declared it.

use crate::DryRun;
use crate::error::{Error, Result};
use cascade_workspace::ProjectGraph;
use futures::future::try_join_all;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Default changes folder, relative to the workspace root.
pub const DEFAULT_CHANGES_FOLDER: &str = "common/changes";

/// Magnitude of a change, ordered from least to most significant.
///
/// `Hotfix` sits between `Dependency` and `Patch` but is exclusive: a package
/// cannot carry a hotfix and a patch, minor or major change in the same
/// release.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// No version change.
    #[default]
    None,
    /// Only dependency ranges changed.
    Dependency,
    /// Emergency prerelease-tagged fix.
    Hotfix,
    /// Patch version bump (0.0.X).
    Patch,
    /// Minor version bump (0.X.0).
    Minor,
    /// Major version bump (X.0.0).
    Major,
}

impl ChangeType {
    /// All change types in ascending order.
    pub const ALL: [Self; 6] = [
        Self::None,
        Self::Dependency,
        Self::Hotfix,
        Self::Patch,
        Self::Minor,
        Self::Major,
    ];

    /// Parses a change type name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == s)
    }

    /// The lowercase name used in change files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Dependency => "dependency",
            Self::Hotfix => "hotfix",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }

    /// Whether this change bumps the package version.
    #[must_use]
    pub const fn is_release(self) -> bool {
        matches!(self, Self::Hotfix | Self::Patch | Self::Minor | Self::Major)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::internal(format!("Invalid change type \"{s}\"")))
    }
}

/// One atomic change request for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDescriptor {
    /// Target package.
    pub package_name: String,
    /// Change magnitude.
    pub change_type: ChangeType,
    /// Explicit new version, used by policy-driven changes.
    pub new_version: Option<Version>,
    /// Free-text comment for the changelog.
    pub comment: Option<String>,
    /// Author of the change.
    pub author: Option<String>,
    /// Commit that introduced the change.
    pub commit: Option<String>,
    /// Arbitrary fields passed through to changelog renderers.
    pub custom_fields: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ChangeDescriptor {
    /// Creates a descriptor with no comment or metadata.
    #[must_use]
    pub fn new(package_name: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            package_name: package_name.into(),
            change_type,
            new_version: None,
            comment: None,
            author: None,
            commit: None,
            custom_fields: None,
        }
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets an explicit new version.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.new_version = Some(version);
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// One entry of a change file's `changes` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Target package.
    pub package_name: String,
    /// Change type as written in the file.
    #[serde(rename = "type")]
    pub change_type: String,
    /// Changelog comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Arbitrary fields for changelog renderers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<serde_json::Map<String, serde_json::Value>>,
    /// Author of the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Commit that introduced the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl ChangeEntry {
    /// Converts the entry into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChangeType`] naming `path` if the type is unknown.
    pub fn to_descriptor(&self, path: &Path) -> Result<ChangeDescriptor> {
        let change_type =
            ChangeType::parse(&self.change_type).ok_or_else(|| Error::InvalidChangeType {
                value: self.change_type.clone(),
                path: path.to_path_buf(),
            })?;
        Ok(ChangeDescriptor {
            package_name: self.package_name.clone(),
            change_type,
            new_version: None,
            comment: self.comment.clone(),
            author: self.author.clone(),
            commit: self.commit.clone(),
            custom_fields: self.custom_fields.clone(),
        })
    }
}

impl From<&ChangeDescriptor> for ChangeEntry {
    fn from(descriptor: &ChangeDescriptor) -> Self {
        Self {
            package_name: descriptor.package_name.clone(),
            change_type: descriptor.change_type.to_string(),
            comment: descriptor.comment.clone(),
            custom_fields: descriptor.custom_fields.clone(),
            author: descriptor.author.clone(),
            commit: descriptor.commit.clone(),
        }
    }
}

/// A persisted change file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFile {
    /// The package the file was created for.
    pub package_name: String,
    /// Contact email of the author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// The changes.
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
}

impl ChangeFile {
    /// Creates an empty change file for a package.
    #[must_use]
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            email: None,
            changes: Vec::new(),
        }
    }

    /// Adds a change unless an identical one is already present.
    pub fn add_change(&mut self, descriptor: &ChangeDescriptor) {
        let entry = ChangeEntry::from(descriptor);
        if !self.changes.contains(&entry) {
            self.changes.push(entry);
        }
    }
}

/// A change file together with the path it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedChangeFile {
    /// Where the file lives.
    pub path: PathBuf,
    /// The parsed file.
    pub file: ChangeFile,
}

impl LoadedChangeFile {
    /// Converts every entry into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidChangeType`] for the first entry with an
    /// unknown type.
    pub fn descriptors(&self) -> Result<Vec<ChangeDescriptor>> {
        self.file
            .changes
            .iter()
            .map(|entry| entry.to_descriptor(&self.path))
            .collect()
    }
}

/// Flattens loaded files into descriptors, in file order.
///
/// # Errors
///
/// Returns [`Error::InvalidChangeType`] for the first unknown type.
pub fn collect_descriptors(files: &[LoadedChangeFile]) -> Result<Vec<ChangeDescriptor>> {
    let mut descriptors = Vec::new();
    for file in files {
        descriptors.extend(file.descriptors()?);
    }
    Ok(descriptors)
}

/// Reads and writes change files under one folder.
#[derive(Debug, Clone)]
pub struct ChangeFileStore {
    folder: PathBuf,
}

impl ChangeFileStore {
    /// Creates a store rooted at `folder`.
    #[must_use]
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// The changes folder.
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Lists every `*.json` file below the folder, sorted by path.
    ///
    /// A missing folder has no change files.
    ///
    /// # Errors
    ///
    /// Returns an error if the glob pattern cannot be built or a directory
    /// cannot be read.
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        if !self.folder.exists() {
            return Ok(Vec::new());
        }
        let pattern = self.folder.join("**").join("*.json");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| {
            Error::change_file_io(
                format!("Invalid changes folder pattern: {e}"),
                Some(self.folder.clone()),
                None,
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                Error::change_file_io("Failed to read changes folder", Some(path), Some(e.into_error()))
            })?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Loads every change file, reading them concurrently.
    ///
    /// The result is ordered by path regardless of completion order.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read or parsed.
    pub async fn load(&self) -> Result<Vec<LoadedChangeFile>> {
        let paths = self.paths()?;
        debug!(folder = %self.folder.display(), count = paths.len(), "Loading change files");

        let files = try_join_all(paths.into_iter().map(|path| async move {
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                Error::change_file_io("Failed to read change file", Some(path.clone()), Some(e))
            })?;
            let file: ChangeFile =
                serde_json::from_str(&content).map_err(|source| Error::ChangeFileParse {
                    path: path.clone(),
                    source,
                })?;
            Ok::<_, Error>(LoadedChangeFile { path, file })
        }))
        .await?;

        Ok(files)
    }

    /// Checks that every change targets a known project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPackage`] for the first unknown package.
    pub fn validate(files: &[LoadedChangeFile], graph: &ProjectGraph) -> Result<()> {
        for loaded in files {
            for entry in &loaded.file.changes {
                if !graph.contains(&entry.package_name) {
                    return Err(Error::UnknownPackage {
                        package: entry.package_name.clone(),
                        path: loaded.path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Writes a new change file as `<folder>/<package>/<timestamp>-<id>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, file: &ChangeFile, dry_run: DryRun) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y-%m-%d-%H-%M");
        let id = Uuid::new_v4().simple().to_string();
        let dir = self.folder.join(&file.package_name);
        let path = dir.join(format!("{stamp}-{}.json", &id[..8]));

        info!(
            mode = dry_run.label(),
            path = %path.display(),
            changes = file.changes.len(),
            "Writing change file"
        );
        if dry_run.is_dry_run() {
            return Ok(path);
        }

        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::change_file_io("Failed to create change directory", Some(dir.clone()), Some(e))
        })?;
        let mut content = serde_json::to_string_pretty(file)?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|e| {
            Error::change_file_io("Failed to write change file", Some(path.clone()), Some(e))
        })?;
        Ok(path)
    }

    /// Deletes consumed change files.
    ///
    /// Returns the number of files removed (or that would be removed).
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be deleted.
    pub async fn delete(&self, files: &[LoadedChangeFile], dry_run: DryRun) -> Result<usize> {
        for loaded in files {
            info!(mode = dry_run.label(), path = %loaded.path.display(), "Deleting change file");
            if !dry_run.is_dry_run() {
                tokio::fs::remove_file(&loaded.path).await.map_err(|e| {
                    Error::change_file_io(
                        "Failed to delete change file",
                        Some(loaded.path.clone()),
                        Some(e),
                    )
                })?;
            }
        }
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_workspace::Project;
    use tempfile::TempDir;

    #[test]
    fn test_change_type_ordering() {
        assert!(ChangeType::None < ChangeType::Dependency);
        assert!(ChangeType::Dependency < ChangeType::Hotfix);
        assert!(ChangeType::Hotfix < ChangeType::Patch);
        assert!(ChangeType::Minor < ChangeType::Major);
        assert_eq!(ChangeType::Patch.max(ChangeType::Minor), ChangeType::Minor);
    }

    #[test]
    fn test_change_type_from_str_is_internal_error() {
        assert_eq!("minor".parse::<ChangeType>().unwrap(), ChangeType::Minor);
        let err = "huge".parse::<ChangeType>().unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }

    #[test]
    fn test_entry_with_bad_type_reports_file() {
        let entry = ChangeEntry {
            package_name: "a".to_string(),
            change_type: "huge".to_string(),
            comment: None,
            custom_fields: None,
            author: None,
            commit: None,
        };
        let err = entry.to_descriptor(Path::new("changes/a.json")).unwrap_err();
        match err {
            Error::InvalidChangeType { value, path } => {
                assert_eq!(value, "huge");
                assert_eq!(path, Path::new("changes/a.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_change_file_json_shape() {
        let json = r#"{
            "packageName": "a",
            "email": "dev@example.com",
            "changes": [
                { "packageName": "a", "type": "patch", "comment": "Fix crash", "author": "dev" }
            ]
        }"#;
        let file: ChangeFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.changes[0].change_type, "patch");

        let out = serde_json::to_value(&file).unwrap();
        assert_eq!(out["changes"][0]["type"], "patch");
        assert!(out["changes"][0].get("commit").is_none());
    }

    #[test]
    fn test_add_change_deduplicates() {
        let mut file = ChangeFile::new("a");
        let descriptor = ChangeDescriptor::new("a", ChangeType::Dependency).with_comment("bump");
        file.add_change(&descriptor);
        file.add_change(&descriptor);
        assert_eq!(file.changes.len(), 1);
    }

    #[tokio::test]
    async fn test_write_load_delete() {
        let temp = TempDir::new().unwrap();
        let store = ChangeFileStore::new(temp.path().join("changes"));

        let mut first = ChangeFile::new("a");
        first.add_change(&ChangeDescriptor::new("a", ChangeType::Minor).with_comment("feature"));
        let mut second = ChangeFile::new("@scope/b");
        second.add_change(&ChangeDescriptor::new("@scope/b", ChangeType::Patch));

        store.write(&first, DryRun::No).unwrap();
        store.write(&second, DryRun::No).unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let mut sorted = loaded.clone();
        sorted.sort_by(|x, y| x.path.cmp(&y.path));
        assert_eq!(loaded, sorted);

        let descriptors = collect_descriptors(&loaded).unwrap();
        assert!(descriptors
            .iter()
            .any(|d| d.package_name == "@scope/b" && d.change_type == ChangeType::Patch));

        assert_eq!(store.delete(&loaded, DryRun::Yes).await.unwrap(), 2);
        assert_eq!(store.load().await.unwrap().len(), 2);

        store.delete(&loaded, DryRun::No).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_folder_has_no_changes() {
        let temp = TempDir::new().unwrap();
        let store = ChangeFileStore::new(temp.path().join("nope"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.json"), "{ not json").unwrap();
        let err = ChangeFileStore::new(temp.path()).load().await.unwrap_err();
        assert!(matches!(err, Error::ChangeFileParse { .. }));
    }

    #[test]
    fn test_dry_run_write_creates_nothing() {
        let temp = TempDir::new().unwrap();
        let store = ChangeFileStore::new(temp.path());
        let path = store.write(&ChangeFile::new("a"), DryRun::Yes).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_validate_unknown_package() {
        let graph = ProjectGraph::new([Project::builder("a", "1.0.0").build()]).unwrap();
        let mut file = ChangeFile::new("a");
        file.add_change(&ChangeDescriptor::new("ghost", ChangeType::Patch));
        let loaded = vec![LoadedChangeFile {
            path: PathBuf::from("x.json"),
            file,
        }];
        let err = ChangeFileStore::validate(&loaded, &graph).unwrap_err();
        assert!(matches!(err, Error::UnknownPackage { package, .. } if package == "ghost"));
    }
}
