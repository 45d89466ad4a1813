//! End-to-end run against a minified bundle with a two-file catalog.
//!
//! The first catalog uses regex replacement syntax, the second sed syntax
//! and a version gate keyed on the bundle's embedded VERSION constant.

use bundle_patcher::backup::{latest_backup, list_backups, restore};
use bundle_patcher::config::{
    check_catalog_version, discover_catalog_files, load_catalogs, Catalog, VersionCheck,
};
use bundle_patcher::{Orchestrator, OutcomeStatus, RunEvent, RunOptions, Selection};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const BUNDLE: &str = concat!(
    "#!/usr/bin/env node\n",
    r#"var VERSION="3.2.1";function Ab(A){if(A.telemetry)return sendEvent("startup",A);return null}"#,
    r#"function Qc(){return{autoUpdate:!0,channel:"latest",maxTokens:4096}}"#,
    r#"var zz=Qc();console.log("Welcome to tool "+VERSION);"#,
    "\n",
);

const PATCHED: &str = concat!(
    "#!/usr/bin/env node\n",
    r#"var VERSION="3.2.1";var PATCHED=!0;function Ab(A){return null}"#,
    r#"function Qc(){return{autoUpdate:!1,channel:"stable",maxTokens:40960}}"#,
    r#"var zz=Qc();console.log("Welcome to tool "+VERSION);"#,
    "\n",
);

const PRIVACY: &str = r#"
[meta]
name = "privacy"

[[modules]]
name = "no-telemetry"
description = "Drop the startup telemetry event"

[[modules.operations]]
pattern = 'if\(A\.telemetry\)return sendEvent\("startup",A\);'
replacement = ''

[[modules]]
name = "pin-channel"
description = "Stay on the stable channel without auto-updates"

[[modules.operations]]
pattern = 'autoUpdate:!0'
replacement = 'autoUpdate:!1'

[[modules.operations]]
pattern = 'channel:"latest"'
replacement = 'channel:"stable"'
"#;

const LIMITS: &str = r#"
[meta]
name = "limits"
version_range = "^3.2"
version_pattern = 'var VERSION="([^"]+)"'
replacement_syntax = "sed"

[[modules]]
name = "more-tokens"
description = "Raise the token limit tenfold"

[[modules.operations]]
pattern = 'maxTokens:(4096)([,}])'
replacement = 'maxTokens:\10\2'

[[modules]]
name = "mark-patched"
description = "Set a global flag so the bundle knows it was patched"

[[modules.operations]]
pattern = '(var VERSION="[^"]+";)(function)'
replacement = '\1var PATCHED=!0;\2'
"#;

struct Fixture {
    _dir: TempDir,
    target: PathBuf,
    catalog: Catalog,
}

fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let patches = dir.path().join("patches");
    fs::create_dir(&patches).unwrap();
    // Written out of order; discovery sorts by name.
    fs::write(patches.join("20-limits.toml"), LIMITS).unwrap();
    fs::write(patches.join("10-privacy.toml"), PRIVACY).unwrap();
    fs::write(patches.join("README.md"), "not a catalog").unwrap();

    let target = dir.path().join("cli.js");
    fs::write(&target, BUNDLE).unwrap();

    let files = discover_catalog_files(&patches).unwrap();
    assert_eq!(files.len(), 2);
    let catalog = load_catalogs(&files).unwrap();

    Fixture {
        _dir: dir,
        target,
        catalog,
    }
}

#[test]
fn test_catalog_merged_in_file_order() {
    let fx = setup();
    let names: Vec<_> = fx.catalog.registry.list_all().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        vec!["no-telemetry", "pin-channel", "more-tokens", "mark-patched"]
    );
    assert_eq!(
        fx.catalog.registry.lookup("more-tokens").unwrap().operations()[0].replacement,
        "maxTokens:${1}0${2}"
    );
}

#[test]
fn test_version_detected_from_bundle() {
    let fx = setup();
    assert_eq!(
        check_catalog_version(&fx.catalog, BUNDLE, None).unwrap(),
        VersionCheck::Satisfied {
            version: "3.2.1".to_string()
        }
    );
    assert!(matches!(
        check_catalog_version(&fx.catalog, BUNDLE, Some("4.0.0")).unwrap(),
        VersionCheck::Unsatisfied { .. }
    ));
}

#[test]
fn test_full_run_patches_bundle() {
    let fx = setup();

    let report = Orchestrator::new(&fx.catalog.registry)
        .run(&fx.target, &Selection::All)
        .unwrap();

    assert!(report.is_success(), "{:?}", report.outcomes);
    assert_eq!(report.applied_count(), 4);
    assert_eq!(fs::read_to_string(&fx.target).unwrap(), PATCHED);

    let backup = report.backup.unwrap();
    assert_eq!(fs::read_to_string(backup).unwrap(), BUNDLE);
}

#[test]
fn test_second_run_changes_nothing() {
    let fx = setup();
    let orchestrator = Orchestrator::new(&fx.catalog.registry);

    assert!(orchestrator.run(&fx.target, &Selection::All).unwrap().is_success());
    let second = orchestrator.run(&fx.target, &Selection::All).unwrap();

    assert_eq!(second.failed_count(), 4);
    assert!(second
        .outcomes
        .iter()
        .all(|o| o.status == OutcomeStatus::ValidationFailed));
    assert_eq!(fs::read_to_string(&fx.target).unwrap(), PATCHED);
    assert_eq!(list_backups(&fx.target).unwrap().len(), 2);
}

#[test]
fn test_restore_latest_after_first_run() {
    let fx = setup();
    Orchestrator::new(&fx.catalog.registry)
        .run(&fx.target, &Selection::All)
        .unwrap();

    let backup = latest_backup(&fx.target).unwrap().unwrap();
    restore(&backup, &fx.target).unwrap();
    assert_eq!(fs::read_to_string(&fx.target).unwrap(), BUNDLE);
}

#[test]
fn test_dry_run_predicts_real_run() {
    let fx = setup();

    let dry = Orchestrator::new(&fx.catalog.registry)
        .with_options(RunOptions { dry_run: true })
        .run(&fx.target, &Selection::All)
        .unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.applied_count(), 4);
    assert!(dry.backup.is_none());
    assert_eq!(fs::read_to_string(&fx.target).unwrap(), BUNDLE);
    assert!(list_backups(&fx.target).unwrap().is_empty());

    let real = Orchestrator::new(&fx.catalog.registry)
        .run(&fx.target, &Selection::All)
        .unwrap();
    let dry_statuses: Vec<_> = dry.outcomes.iter().map(|o| o.status).collect();
    let real_statuses: Vec<_> = real.outcomes.iter().map(|o| o.status).collect();
    assert_eq!(dry_statuses, real_statuses);
}

#[test]
fn test_event_stream_for_selected_modules() {
    let fx = setup();
    let selection = Selection::from_names(vec!["mark-patched".into(), "pin-channel".into()]);

    let mut events = Vec::new();
    let report = Orchestrator::new(&fx.catalog.registry)
        .run_with(&fx.target, &selection, |event| {
            events.push(match event {
                RunEvent::BackupCreated { .. } => "backup".to_string(),
                RunEvent::ModuleStarted { name, .. } => format!("start {name}"),
                RunEvent::Validated { name } => format!("valid {name}"),
                RunEvent::OperationApplied { name, op } => format!("op {name} #{}", op.index),
                RunEvent::Changed { name, committed, .. } => {
                    format!("changed {name} {committed}")
                }
                RunEvent::Finished { outcome } => format!("done {}", outcome.module_name),
            })
        })
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        events,
        vec![
            "backup",
            "start mark-patched",
            "valid mark-patched",
            "op mark-patched #0",
            "changed mark-patched true",
            "done mark-patched",
            "start pin-channel",
            "valid pin-channel",
            "op pin-channel #0",
            "op pin-channel #1",
            "changed pin-channel true",
            "done pin-channel",
        ]
    );

    let content = fs::read_to_string(&fx.target).unwrap();
    assert!(content.contains("PATCHED=!0"));
    assert!(content.contains("maxTokens:4096}"));
    assert!(content.contains("sendEvent"));
}
