//! Patch orchestrator: backup, then validate → substitute → commit per module.
//!
//! A run moves through `Start → BackupCreated → ModuleLoop → Reported`.
//! Only a failed backup or an unreadable target aborts the run. Every other
//! failure is scoped to one module and recorded in the [`RunReport`]; modules
//! are independent, so a failure never rolls back an earlier commit.
//!
//! Runs are strictly sequential. Concurrent runs against the same target are
//! not coordinated; callers must not start two at once.

use crate::backup::{create_backup, BackupError};
use crate::commit::{atomic_write, resolve_target};
use crate::registry::{PatchModule, Registry};
use crate::substitute::{apply_with, OperationApplied};
use crate::validate::validate;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which modules a run applies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every registered module, in registration order
    #[default]
    All,
    /// The named modules, in the given order
    Named(Vec<String>),
}

impl Selection {
    /// An empty list selects every module.
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            Selection::All
        } else {
            Selection::Named(names)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Validate and substitute in memory only: no backup, no commit
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    Applied,
    /// Every operation changed the text but the module's net effect was nil
    Skipped,
    ValidationFailed,
    SubstitutionFailed,
    /// The requested module is not registered
    Unknown,
}

impl OutcomeStatus {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            OutcomeStatus::ValidationFailed
                | OutcomeStatus::SubstitutionFailed
                | OutcomeStatus::Unknown
        )
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeStatus::Applied => "applied",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::ValidationFailed => "validation failed",
            OutcomeStatus::SubstitutionFailed => "substitution failed",
            OutcomeStatus::Unknown => "unknown module",
        };
        f.write_str(s)
    }
}

/// Result of one module in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for success/failure"]
pub struct PatchOutcome {
    pub module_name: String,
    pub status: OutcomeStatus,
    pub detail: String,
}

impl PatchOutcome {
    fn new(module_name: &str, status: OutcomeStatus, detail: impl Into<String>) -> Self {
        Self {
            module_name: module_name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.module_name, self.status, self.detail)
    }
}

/// Aggregated result of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Backup written before the module loop (`None` for dry runs)
    pub backup: Option<PathBuf>,
    pub outcomes: Vec<PatchOutcome>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn applied(&self) -> impl Iterator<Item = &PatchOutcome> + '_ {
        self.with_status(|s| s == OutcomeStatus::Applied)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PatchOutcome> + '_ {
        self.with_status(OutcomeStatus::is_failure)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PatchOutcome> + '_ {
        self.with_status(|s| s == OutcomeStatus::Skipped)
    }

    pub fn applied_count(&self) -> usize {
        self.applied().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// True iff no module failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn outcome(&self, module_name: &str) -> Option<&PatchOutcome> {
        self.outcomes.iter().find(|o| o.module_name == module_name)
    }

    fn with_status<P>(&self, pred: P) -> impl Iterator<Item = &PatchOutcome> + '_
    where
        P: Fn(OutcomeStatus) -> bool + 'static,
    {
        self.outcomes.iter().filter(move |o| pred(o.status))
    }
}

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    BackupCreated {
        path: &'a Path,
    },
    ModuleStarted {
        name: &'a str,
        operations: usize,
    },
    Validated {
        name: &'a str,
    },
    OperationApplied {
        name: &'a str,
        op: OperationApplied,
    },
    /// A module produced new content. `committed` is false for dry runs.
    Changed {
        name: &'a str,
        before: &'a str,
        after: &'a str,
        committed: bool,
    },
    Finished {
        outcome: &'a PatchOutcome,
    },
}

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("backup failed, no modules were applied: {0}")]
    Backup(#[from] BackupError),

    #[error("cannot read target {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        /// Outcomes of modules that finished before the read failed. Any
        /// `Applied` entry here is already committed.
        completed: Vec<PatchOutcome>,
    },
}

impl RunError {
    /// Modules that finished before the run was aborted.
    pub fn completed(&self) -> &[PatchOutcome] {
        match self {
            RunError::Read { completed, .. } => completed,
            RunError::Backup(_) => &[],
        }
    }
}

/// Applies registry modules to a single target file.
#[derive(Debug, Clone, Copy)]
pub struct Orchestrator<'r> {
    registry: &'r Registry,
    options: RunOptions,
}

impl<'r> Orchestrator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run(&self, target: &Path, selection: &Selection) -> Result<RunReport, RunError> {
        self.run_with(target, selection, |_| {})
    }

    /// Run and report progress to `on_event`.
    pub fn run_with<F>(
        &self,
        target: &Path,
        selection: &Selection,
        mut on_event: F,
    ) -> Result<RunReport, RunError>
    where
        F: FnMut(RunEvent<'_>),
    {
        let mut report = RunReport {
            dry_run: self.options.dry_run,
            ..RunReport::default()
        };

        // Backups, reads and commits all go to the real file behind a symlink.
        let resolved = resolve_target(target);
        let target = resolved.as_path();

        // Dry runs carry content forward in memory instead of on disk.
        let mut staged: Option<String> = None;

        if self.options.dry_run {
            staged = Some(read_target(target)?);
        } else {
            let backup = create_backup(target)?;
            on_event(RunEvent::BackupCreated { path: &backup });
            report.backup = Some(backup);
        }

        for requested in self.resolve(selection) {
            let outcome = match requested {
                Ok(module) => match self.run_module(target, module, &mut staged, &mut on_event) {
                    Ok(outcome) => outcome,
                    Err(RunError::Read { path, source, .. }) => {
                        for done in report.applied() {
                            tracing::warn!(module = %done.module_name, "committed before the run was aborted");
                        }
                        return Err(RunError::Read {
                            path,
                            source,
                            completed: report.outcomes,
                        });
                    }
                    Err(e) => return Err(e),
                },
                Err(name) => PatchOutcome::new(
                    name,
                    OutcomeStatus::Unknown,
                    format!("unknown module '{name}'"),
                ),
            };

            if outcome.status.is_failure() {
                tracing::warn!(module = %outcome.module_name, status = %outcome.status, "{}", outcome.detail);
            }
            on_event(RunEvent::Finished { outcome: &outcome });
            report.outcomes.push(outcome);
        }

        tracing::info!(
            applied = report.applied_count(),
            failed = report.failed_count(),
            "run finished"
        );
        Ok(report)
    }

    /// Resolve the selection against the registry, keeping unknown names.
    fn resolve<'s>(
        &self,
        selection: &'s Selection,
    ) -> Vec<Result<&'r PatchModule, &'s str>> {
        match selection {
            Selection::All => self.registry.iter().map(Ok).collect(),
            Selection::Named(names) => names
                .iter()
                .map(|name| self.registry.lookup(name).map_err(|_| name.as_str()))
                .collect(),
        }
    }

    fn run_module<F>(
        &self,
        target: &Path,
        module: &PatchModule,
        staged: &mut Option<String>,
        on_event: &mut F,
    ) -> Result<PatchOutcome, RunError>
    where
        F: FnMut(RunEvent<'_>),
    {
        let name = module.name();
        on_event(RunEvent::ModuleStarted {
            name,
            operations: module.operations().len(),
        });

        // Always validate against the current state: earlier modules may
        // have changed it.
        let current = match staged {
            Some(content) => content.clone(),
            None => read_target(target)?,
        };

        if let Err(e) = validate(module, &current) {
            return Ok(PatchOutcome::new(
                name,
                OutcomeStatus::ValidationFailed,
                e.to_string(),
            ));
        }
        on_event(RunEvent::Validated { name });

        let mut replacements = 0;
        let result = apply_with(module, &current, |op| {
            replacements += op.matches;
            on_event(RunEvent::OperationApplied { name, op });
        });
        let next = match result {
            Ok(next) => next,
            Err(e) => {
                return Ok(PatchOutcome::new(
                    name,
                    OutcomeStatus::SubstitutionFailed,
                    e.to_string(),
                ))
            }
        };

        if next == current {
            return Ok(PatchOutcome::new(
                name,
                OutcomeStatus::Skipped,
                "operations cancelled out, no net change",
            ));
        }

        let ops = module.operations().len();
        if self.options.dry_run {
            on_event(RunEvent::Changed {
                name,
                before: &current,
                after: &next,
                committed: false,
            });
            *staged = Some(next);
            return Ok(PatchOutcome::new(
                name,
                OutcomeStatus::Applied,
                format!("would apply {ops} operation(s), {replacements} replacement(s)"),
            ));
        }

        if let Err(e) = atomic_write(target, next.as_bytes()) {
            return Ok(PatchOutcome::new(
                name,
                OutcomeStatus::SubstitutionFailed,
                e.to_string(),
            ));
        }
        tracing::info!(module = name, replacements, "module committed");
        on_event(RunEvent::Changed {
            name,
            before: &current,
            after: &next,
            committed: true,
        });

        Ok(PatchOutcome::new(
            name,
            OutcomeStatus::Applied,
            format!("applied {ops} operation(s), {replacements} replacement(s)"),
        ))
    }
}

fn read_target(target: &Path) -> Result<String, RunError> {
    fs::read_to_string(target).map_err(|source| RunError::Read {
        path: target.to_path_buf(),
        source,
        completed: Vec::new(),
    })
}
