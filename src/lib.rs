//! Bundle Patcher: regex-driven patching for packaged application bundles
//!
//! Rewrites a single target text file (typically a bundled JavaScript
//! entrypoint) using a catalog of named patch modules. Each module is an
//! ordered list of pattern/replacement operations applied all-or-nothing.
//!
//! # Architecture
//!
//! - [`Registry`]: ordered, name-indexed modules (built from a [`config::Catalog`])
//! - [`validate()`]: every pattern of a module must match the current content
//! - [`substitute::apply`]: sequential, global substitutions on a staged buffer
//! - [`backup`]: timestamped copy of the target before anything is touched
//! - [`Orchestrator`]: backup, then validate → substitute → commit per module
//!
//! # Safety
//!
//! - One backup per run, confirmed by hash before any module runs
//! - Atomic commits (tempfile + fsync + rename), permissions preserved
//! - A failing module leaves the target byte-identical
//! - Re-applying a module is detected and reported as a failure
//!
//! # Example
//!
//! ```no_run
//! use bundle_patcher::{Orchestrator, PatchOperation, Registry, Selection};
//! use std::path::Path;
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         "disable-telemetry",
//!         "Turn off usage reporting",
//!         vec![PatchOperation::new(r"telemetry:\s*true", "telemetry:false")],
//!     )
//!     .unwrap();
//!
//! let report = Orchestrator::new(&registry)
//!     .run(Path::new("dist/cli.js"), &Selection::All)
//!     .unwrap();
//! for outcome in &report.outcomes {
//!     println!("{outcome}");
//! }
//! ```

pub mod backup;
pub mod cache;
pub mod commit;
pub mod config;
pub mod orchestrator;
pub mod registry;
pub mod substitute;
pub mod validate;

// Re-exports
pub use backup::{create_backup, latest_backup, list_backups, restore, BackupError};
pub use commit::{atomic_write, resolve_target, CommitError};
pub use config::{
    load_catalogs, load_from_path, load_from_str, Catalog, ConfigError, VersionError,
};
pub use orchestrator::{
    Orchestrator, OutcomeStatus, PatchOutcome, RunError, RunEvent, RunOptions, RunReport,
    Selection,
};
pub use registry::{PatchModule, PatchOperation, Registry, RegistryError};
pub use substitute::{OperationApplied, SubstitutionError};
pub use validate::{validate, ValidationError};
