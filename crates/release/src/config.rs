//! Release configuration.
//!
//! Release settings live next to the project list in `cascade.json`:
//!
//! ```json
//! {
//!   "projects": [],
//!   "hotfixChangeEnabled": false,
//!   "changesFolder": "common/changes",
//!   "versionPoliciesFile": "common/config/version-policies.json",
//!   "gitTagSeparator": "_"
//! }
//! ```

use crate::change::DEFAULT_CHANGES_FOLDER;
use crate::error::{Error, Result};
use crate::policy::DEFAULT_POLICIES_FILE;
use crate::publish::DEFAULT_TAG_SEPARATOR;
use cascade_workspace::CONFIG_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Release settings of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReleaseConfig {
    /// Whether hotfix changes are accepted.
    pub hotfix_change_enabled: bool,
    /// Change files folder, relative to the workspace root.
    pub changes_folder: PathBuf,
    /// Version policies file, relative to the workspace root.
    pub version_policies_file: PathBuf,
    /// Separator between package name and version in release tags.
    pub git_tag_separator: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            hotfix_change_enabled: true,
            changes_folder: PathBuf::from(DEFAULT_CHANGES_FOLDER),
            version_policies_file: PathBuf::from(DEFAULT_POLICIES_FILE),
            git_tag_separator: DEFAULT_TAG_SEPARATOR.to_string(),
        }
    }
}

impl ReleaseConfig {
    /// Reads the release settings from `cascade.json` under `root`.
    ///
    /// Unset fields take their defaults. The project list is read by the
    /// workspace loader and ignored here.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or
    /// [`Error::Config`] if a setting is invalid.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let config: Self = cascade_workspace::read_json_file(&path)?;
        config.validate()?;
        debug!(
            path = %path.display(),
            hotfix = config.hotfix_change_enabled,
            changes = %config.changes_folder.display(),
            "Loaded release config"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.git_tag_separator.is_empty() {
            return Err(Error::config(
                "gitTagSeparator must not be empty",
                "Remove the setting to use the default '_'",
            ));
        }
        if self.changes_folder.as_os_str().is_empty() {
            return Err(Error::config(
                "changesFolder must not be empty",
                format!("Remove the setting to use the default '{DEFAULT_CHANGES_FOLDER}'"),
            ));
        }
        Ok(())
    }

    /// Absolute change files folder.
    #[must_use]
    pub fn changes_path(&self, root: &Path) -> PathBuf {
        root.join(&self.changes_folder)
    }

    /// Absolute version policies file.
    #[must_use]
    pub fn policies_path(&self, root: &Path) -> PathBuf {
        root.join(&self.version_policies_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, content: &str) {
        std::fs::write(dir.path().join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_defaults_when_unset() {
        let dir = TempDir::new().unwrap();
        write(&dir, r#"{ "projects": [] }"#);

        let config = ReleaseConfig::load(dir.path()).unwrap();
        assert_eq!(config, ReleaseConfig::default());
        assert!(config.hotfix_change_enabled);
        assert_eq!(
            config.changes_path(dir.path()),
            dir.path().join("common/changes")
        );
        assert_eq!(
            config.policies_path(dir.path()),
            dir.path().join("common/config/version-policies.json")
        );
    }

    #[test]
    fn test_overrides() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            r#"{
                "projects": [],
                "hotfixChangeEnabled": false,
                "changesFolder": "changes",
                "gitTagSeparator": "@"
            }"#,
        );

        let config = ReleaseConfig::load(dir.path()).unwrap();
        assert!(!config.hotfix_change_enabled);
        assert_eq!(config.changes_folder, PathBuf::from("changes"));
        assert_eq!(config.git_tag_separator, "@");
    }

    #[test]
    fn test_empty_separator_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, r#"{ "gitTagSeparator": "" }"#);
        assert!(matches!(
            ReleaseConfig::load(dir.path()),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(ReleaseConfig::load(dir.path()).is_err());
    }
}
