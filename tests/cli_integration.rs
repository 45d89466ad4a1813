//! Integration tests for the CLI
//!
//! Runs the built binary for apply, check, list and restore.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to create a workspace with a target bundle and a patches/ directory
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(
        dir.path().join("cli.js"),
        "// Version: 1.4.2\nconst BANNER=\"Welcome\";var telemetry={enabled:true};\n",
    )
    .unwrap();

    let patches_dir = dir.path().join("patches");
    fs::create_dir(&patches_dir).unwrap();
    fs::write(
        patches_dir.join("tweaks.toml"),
        r#"[meta]
name = "tweaks"
version_range = "^1.4"
version_pattern = '// Version: (\S+)'

[[modules]]
name = "no-telemetry"
description = "Disable telemetry"

[[modules.operations]]
pattern = 'telemetry=\{enabled:true\}'
replacement = 'telemetry={enabled:false}'

[[modules]]
name = "quiet-banner"
description = "Empty the startup banner"

[[modules.operations]]
pattern = 'BANNER="[^"]*"'
replacement = 'BANNER=""'
"#,
    )
    .unwrap();

    dir
}

fn run(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bundle-patcher"))
        .args(args)
        .current_dir(workspace)
        .env_remove("BUNDLE_PATCHER_CATALOG")
        .env_remove("BUNDLE_PATCHER_TARGET")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

fn backups(workspace: &Path) -> Vec<String> {
    fs::read_dir(workspace)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("cli.js.backup."))
        .collect()
}

#[test]
fn test_apply_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_bundle-patcher"))
        .args(["apply", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Back up the target, then apply modules"));
}

#[test]
fn test_apply_all() {
    let workspace = setup_workspace();

    let output = run(workspace.path(), &["apply", "--target", "cli.js"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Target:"));
    assert!(stdout.contains("Version: 1.4.2"));
    assert!(stdout.contains("Backup:"));
    assert!(stdout.contains("Summary:"));

    let patched = fs::read_to_string(workspace.path().join("cli.js")).unwrap();
    assert!(patched.contains("telemetry={enabled:false}"));
    assert!(patched.contains("BANNER=\"\""));
    assert_eq!(backups(workspace.path()).len(), 1);
}

#[test]
fn test_apply_twice_fails_second_time() {
    let workspace = setup_workspace();

    let first = run(workspace.path(), &["apply", "-t", "cli.js"]);
    assert!(first.status.success());
    let after_first = fs::read_to_string(workspace.path().join("cli.js")).unwrap();

    let second = run(workspace.path(), &["apply", "-t", "cli.js"]);
    assert_eq!(second.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("Validation failed"));

    assert_eq!(
        fs::read_to_string(workspace.path().join("cli.js")).unwrap(),
        after_first
    );
}

#[test]
fn test_apply_selected_with_unknown_module() {
    let workspace = setup_workspace();

    let output = run(
        workspace.path(),
        &["apply", "-t", "cli.js", "--modules", "nope,quiet-banner"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown module 'nope'"));

    let patched = fs::read_to_string(workspace.path().join("cli.js")).unwrap();
    assert!(patched.contains("BANNER=\"\""));
    assert!(patched.contains("telemetry={enabled:true}"));
}

#[test]
fn test_check_does_not_modify() {
    let workspace = setup_workspace();
    let before = fs::read_to_string(workspace.path().join("cli.js")).unwrap();

    let output = run(workspace.path(), &["check", "-t", "cli.js", "--diff"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would apply"));
    assert!(stdout.contains("+const BANNER=\"\""));
    assert_eq!(
        fs::read_to_string(workspace.path().join("cli.js")).unwrap(),
        before
    );
    assert!(backups(workspace.path()).is_empty());
}

#[test]
fn test_version_gate_blocks_and_force_overrides() {
    let workspace = setup_workspace();
    let target = workspace.path().join("cli.js");
    let original = fs::read_to_string(&target).unwrap();

    let blocked = run(workspace.path(), &["apply", "-t", "cli.js", "--target-version", "2.0.0"]);
    assert_eq!(blocked.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&blocked.stderr).contains("does not satisfy"));
    assert_eq!(fs::read_to_string(&target).unwrap(), original);
    assert!(backups(workspace.path()).is_empty());

    let forced = run(
        workspace.path(),
        &["apply", "-t", "cli.js", "--target-version", "2.0.0", "--force"],
    );
    assert!(forced.status.success());
    assert_ne!(fs::read_to_string(&target).unwrap(), original);
}

#[test]
fn test_list() {
    let workspace = setup_workspace();

    let output = run(workspace.path(), &["list"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("no-telemetry"));
    assert!(stdout.contains("Disable telemetry"));
    assert!(stdout.contains("quiet-banner"));
    let first = stdout.find("no-telemetry").unwrap();
    let second = stdout.find("quiet-banner").unwrap();
    assert!(first < second);
}

#[test]
fn test_restore_latest() {
    let workspace = setup_workspace();
    let target = workspace.path().join("cli.js");
    let original = fs::read_to_string(&target).unwrap();

    assert!(run(workspace.path(), &["apply", "-t", "cli.js"]).status.success());
    assert_ne!(fs::read_to_string(&target).unwrap(), original);

    let output = run(workspace.path(), &["restore", "-t", "cli.js"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Restored"));
    assert_eq!(fs::read_to_string(&target).unwrap(), original);
}

#[test]
fn test_missing_catalog_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cli.js"), "x").unwrap();

    let output = run(dir.path(), &["apply", "-t", "cli.js"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no .toml patch catalogs found"));
}
