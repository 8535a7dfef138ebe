//! Commands run against workspaces on disk.

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use cascade::cli::{CliError, EXIT_CLI, exit_code_for};
use cascade::commands::{Command, execute};
use cascade_release::{ChangeFileStore, PolicyRegistry};
use cascade_workspace::PackageManifest;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// `app -> core` with `core` and `tools` in a lockstep policy.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "cascade.json",
        r#"{
            "projects": [
                { "packageName": "core", "projectFolder": "libs/core", "versionPolicyName": "platform" },
                { "packageName": "tools", "projectFolder": "libs/tools", "versionPolicyName": "platform" },
                { "packageName": "app", "projectFolder": "apps/app", "shouldPublish": true }
            ]
        }"#,
    );
    write(
        root,
        "common/config/version-policies.json",
        r#"[
            { "policyName": "platform", "definitionName": "lockStepVersion", "version": "2.0.0", "mainProject": "core" }
        ]"#,
    );
    write(root, "libs/core/package.json", r#"{ "name": "core", "version": "2.0.0" }"#);
    write(root, "libs/tools/package.json", r#"{ "name": "tools", "version": "2.0.0" }"#);
    write(
        root,
        "apps/app/package.json",
        r#"{ "name": "app", "version": "1.4.0", "dependencies": { "core": "^2.0.0" } }"#,
    );
    dir
}

fn path(dir: &TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

fn change_add(dir: &TempDir, package: &str, change_type: &str, dry_run: bool) -> Command {
    Command::ChangeAdd {
        path: path(dir),
        package: package.to_string(),
        change_type: change_type.to_string(),
        comment: Some(format!("{change_type} change")),
        email: Some("dev@example.com".to_string()),
        dry_run,
    }
}

fn read(dir: &TempDir, rel: &str) -> PackageManifest {
    PackageManifest::read(&dir.path().join(rel)).unwrap()
}

async fn pending(dir: &TempDir) -> usize {
    ChangeFileStore::new(dir.path().join("common/changes"))
        .load()
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn status_without_changes() {
    let dir = workspace();
    let output = execute(Command::Status { path: path(&dir) }, false).await.unwrap();
    assert!(output.starts_with("No pending changes found."));
}

#[tokio::test]
async fn change_add_then_status() {
    let dir = workspace();
    let output = execute(change_add(&dir, "core", "minor", false), false).await.unwrap();
    assert!(output.starts_with("Created change file:"));
    assert_eq!(pending(&dir).await, 1);

    let output = execute(Command::Status { path: path(&dir) }, true).await.unwrap();
    let status: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(status["status"], "ok");
    let packages = status["data"]["packages"].as_array().unwrap();
    let names: Vec<&str> = packages.iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["core", "tools", "app"]);
    assert_eq!(packages[0]["next"], "2.1.0");
    assert_eq!(packages[2]["change_type"], "dependency");
    assert_eq!(status["data"]["policies"][0]["next"], "2.1.0");
}

#[tokio::test]
async fn change_add_dry_run_writes_nothing() {
    let dir = workspace();
    let output = execute(change_add(&dir, "app", "patch", true), false).await.unwrap();
    assert!(output.starts_with("Would create change file:"));
    assert_eq!(pending(&dir).await, 0);
}

#[tokio::test]
async fn change_add_rejects_bad_input() {
    let dir = workspace();
    let err = execute(change_add(&dir, "missing", "patch", false), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::Config { .. }));
    assert_eq!(exit_code_for(&err), EXIT_CLI);

    let err = execute(change_add(&dir, "app", "enormous", false), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("enormous"));
}

#[tokio::test]
async fn publish_applies_changes_and_consumes_files() {
    let dir = workspace();
    execute(change_add(&dir, "core", "patch", false), false).await.unwrap();
    execute(change_add(&dir, "app", "minor", false), false).await.unwrap();

    let command = Command::Publish {
        path: path(&dir),
        prerelease_name: None,
        suffix: None,
        partial: false,
        tag_separator: None,
        dry_run: false,
    };
    let output = execute(command, true).await.unwrap();
    let result: serde_json::Value = serde_json::from_str(&output).unwrap();
    let tags: Vec<&str> = result["data"]["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["core_v2.0.1", "tools_v2.0.1", "app_v1.5.0"]);
    assert_eq!(result["data"]["changelogs"], serde_json::json!(["core 2.0.1", "app 1.5.0"]));
    assert_eq!(result["data"]["change_files"], 2);

    assert_eq!(read(&dir, "libs/core/package.json").version, "2.0.1");
    assert_eq!(read(&dir, "libs/tools/package.json").version, "2.0.1");
    let app = read(&dir, "apps/app/package.json");
    assert_eq!(app.version, "1.5.0");
    assert_eq!(app.dependencies["core"], "^2.0.1");

    let registry = PolicyRegistry::load(&dir.path().join("common/config/version-policies.json")).unwrap();
    let platform = registry.get("platform").unwrap().as_lockstep().unwrap();
    assert_eq!(platform.version.to_string(), "2.0.1");
    assert_eq!(pending(&dir).await, 0);
}

#[tokio::test]
async fn prerelease_publish_tags_written_versions() {
    let dir = workspace();
    execute(change_add(&dir, "core", "patch", false), false).await.unwrap();
    execute(change_add(&dir, "app", "minor", false), false).await.unwrap();

    let command = Command::Publish {
        path: path(&dir),
        prerelease_name: Some("beta".to_string()),
        suffix: None,
        partial: false,
        tag_separator: None,
        dry_run: false,
    };
    let output = execute(command, true).await.unwrap();
    let result: serde_json::Value = serde_json::from_str(&output).unwrap();
    let packages = result["data"]["packages"].as_array().unwrap();
    let tags: Vec<&str> = packages.iter().map(|p| p["tag"].as_str().unwrap()).collect();
    assert_eq!(tags, vec!["core_v2.0.1-beta", "tools_v2.0.1-beta", "app_v1.5.0-beta"]);

    assert_eq!(read(&dir, "libs/core/package.json").version, "2.0.1-beta");
    assert_eq!(read(&dir, "apps/app/package.json").version, "1.5.0-beta");
    assert_eq!(packages[2]["version"], "1.5.0-beta");

    assert_eq!(result["data"]["changelogs"], serde_json::json!([]));
    assert_eq!(result["data"]["change_files"], 0);
    assert_eq!(pending(&dir).await, 2);
    let registry = PolicyRegistry::load(&dir.path().join("common/config/version-policies.json")).unwrap();
    let platform = registry.get("platform").unwrap().as_lockstep().unwrap();
    assert_eq!(platform.version.to_string(), "2.0.0");
}

#[tokio::test]
async fn publish_dry_run_leaves_workspace_untouched() {
    let dir = workspace();
    execute(change_add(&dir, "core", "major", false), false).await.unwrap();

    let command = Command::Publish {
        path: path(&dir),
        prerelease_name: None,
        suffix: None,
        partial: false,
        tag_separator: Some("@".to_string()),
        dry_run: true,
    };
    let output = execute(command, false).await.unwrap();
    assert!(output.starts_with("Would publish 3 package(s):"));
    assert!(output.contains("core 3.0.0 (core@v3.0.0)"));

    assert_eq!(read(&dir, "libs/core/package.json").version, "2.0.0");
    assert_eq!(read(&dir, "apps/app/package.json").dependencies["core"], "^2.0.0");
    assert_eq!(pending(&dir).await, 1);
}

#[tokio::test]
async fn publish_without_changes() {
    let dir = workspace();
    let command = Command::Publish {
        path: path(&dir),
        prerelease_name: None,
        suffix: None,
        partial: false,
        tag_separator: None,
        dry_run: false,
    };
    assert_eq!(
        execute(command, false).await.unwrap(),
        "No pending changes to publish."
    );
}

#[tokio::test]
async fn version_bump_moves_policy_and_dependents() {
    let dir = workspace();
    let command = Command::VersionBump {
        path: path(&dir),
        policy: Some("platform".to_string()),
        bump_type: Some("minor".to_string()),
        identifier: None,
        dry_run: false,
    };
    let output = execute(command, true).await.unwrap();
    let result: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(result["data"]["policies"]["platform"], "2.1.0");
    assert_eq!(result["data"]["versions"]["core"], "2.1.0");

    assert_eq!(read(&dir, "libs/tools/package.json").version, "2.1.0");
    let app = read(&dir, "apps/app/package.json");
    assert_eq!(app.dependencies["core"], "^2.1.0");
}

#[tokio::test]
async fn version_bump_rejects_unknown_bump_type() {
    let dir = workspace();
    let command = Command::VersionBump {
        path: path(&dir),
        policy: None,
        bump_type: Some("sideways".to_string()),
        identifier: None,
        dry_run: true,
    };
    let err = execute(command, false).await.unwrap_err();
    assert!(matches!(err, CliError::Config { .. }));
}

#[tokio::test]
async fn version_ensure_aligns_members() {
    let dir = workspace();
    write(dir.path(), "libs/tools/package.json", r#"{ "name": "tools", "version": "1.9.0" }"#);

    let command = Command::VersionEnsure {
        path: path(&dir),
        policy: None,
        force: false,
        email: None,
        dry_run: false,
    };
    let output = execute(command, false).await.unwrap();
    assert!(output.starts_with("Updated 1 package(s):"));
    assert_eq!(read(&dir, "libs/tools/package.json").version, "2.0.0");
}

#[tokio::test]
async fn version_ensure_unknown_policy() {
    let dir = workspace();
    let command = Command::VersionEnsure {
        path: path(&dir),
        policy: Some("nope".to_string()),
        force: false,
        email: None,
        dry_run: true,
    };
    let err = execute(command, false).await.unwrap_err();
    assert_eq!(exit_code_for(&err), EXIT_CLI);
}
