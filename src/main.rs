use anyhow::Result;
use bundle_patcher::backup::{latest_backup, restore};
use bundle_patcher::config::{
    check_catalog_version, discover_catalog_files, load_catalogs, Catalog, ConfigError,
    VersionCheck,
};
use bundle_patcher::{
    Orchestrator, OutcomeStatus, PatchOutcome, RunEvent, RunOptions, RunReport, Selection,
};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Longest line shown in diffs; bundles are often minified into huge lines.
const DIFF_LINE_LIMIT: usize = 160;

#[derive(Parser)]
#[command(name = "bundle-patcher")]
#[command(about = "Regex-driven patching for packaged application bundles", long_about = None)]
#[command(version)]
struct Cli {
    /// Catalog file or directory of .toml catalogs (default: ./patches)
    #[arg(short, long, global = true, env = "BUNDLE_PATCHER_CATALOG")]
    catalog: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// File to patch
    #[arg(short, long, env = "BUNDLE_PATCHER_TARGET")]
    target: PathBuf,

    /// Modules to apply, in order (default: all, in catalog order)
    #[arg(short, long, value_delimiter = ',')]
    modules: Vec<String>,

    /// Target version, overrides detection through the catalog's version_pattern
    #[arg(long)]
    target_version: Option<String>,

    /// Apply even if the target's version is outside the catalog's version_range
    #[arg(long)]
    force: bool,

    /// Show a diff of each module's change
    #[arg(short, long)]
    diff: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the target, then apply modules
    Apply {
        #[command(flatten)]
        target: TargetArgs,

        /// Dry run - validate and substitute in memory without touching files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Report which modules would apply, without touching files
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the modules in the catalog
    List,

    /// Restore the target from a backup
    Restore {
        /// File to restore
        #[arg(short, long, env = "BUNDLE_PATCHER_TARGET")]
        target: PathBuf,

        /// Backup to restore from (default: the newest one)
        #[arg(short, long)]
        backup: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply { target, dry_run } => cmd_apply(cli.catalog, target, dry_run),
        Commands::Check { target } => cmd_apply(cli.catalog, target, true),
        Commands::List => cmd_list(cli.catalog),
        Commands::Restore { target, backup } => cmd_restore(&target, backup),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load the catalog from an explicit file or directory, or from ./patches.
fn load_catalog(explicit: Option<PathBuf>) -> Result<Catalog> {
    let (dir, files) = match explicit {
        Some(path) if path.is_file() => return Ok(load_catalogs(&[path])?),
        Some(path) => {
            let files = discover_catalog_files(&path)?;
            (path, files)
        }
        None => {
            let dir = env::current_dir()?.join("patches");
            let files = if dir.is_dir() {
                discover_catalog_files(&dir)?
            } else {
                Vec::new()
            };
            (dir, files)
        }
    };

    if files.is_empty() {
        return Err(ConfigError::NoCatalogs {
            searched: vec![dir],
        }
        .into());
    }
    Ok(load_catalogs(&files)?)
}

/// Check the catalog's version_range against the target. Returns false if
/// the run must not proceed.
fn version_gate(catalog: &Catalog, target: &Path, args: &TargetArgs) -> Result<bool> {
    let content = fs::read_to_string(target)
        .map_err(|e| anyhow::anyhow!("cannot read target {}: {e}", target.display()))?;

    match check_catalog_version(catalog, &content, args.target_version.as_deref())? {
        VersionCheck::Unconstrained => {}
        VersionCheck::Satisfied { version } => {
            println!("Version: {}", version);
        }
        VersionCheck::Undetected => {
            eprintln!(
                "{}",
                "Warning: could not determine the target's version, proceeding anyway".yellow()
            );
        }
        VersionCheck::Unsatisfied {
            version,
            requirement,
        } => {
            let msg = format!("target version {version} does not satisfy version_range {requirement}");
            if args.force {
                eprintln!("{}", format!("Warning: {msg} (--force)").yellow());
            } else {
                eprintln!("{} {}", "✗".red(), msg);
                eprintln!("  Use --target-version to override detection or --force to apply anyway");
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn cmd_apply(catalog: Option<PathBuf>, args: TargetArgs, dry_run: bool) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let target = args.target.clone();

    println!("Target: {}", target.display());
    for source in &catalog.sources {
        println!("Catalog: {}", source.display());
    }

    if !version_gate(&catalog, &target, &args)? {
        std::process::exit(1);
    }
    println!();

    if dry_run {
        println!("{}", "[DRY RUN - no files will be modified]".cyan());
    }

    let selection = Selection::from_names(args.modules.clone());
    let orchestrator =
        Orchestrator::new(&catalog.registry).with_options(RunOptions { dry_run });

    let show_diff = args.diff;
    let report = match orchestrator.run_with(&target, &selection, |event| {
        print_event(event, show_diff, dry_run)
    }) {
        Ok(report) => report,
        Err(e) => {
            let committed = join_names(
                e.completed()
                    .iter()
                    .filter(|o| o.status == OutcomeStatus::Applied),
            );
            if !committed.is_empty() {
                eprintln!("{} Already applied before the run stopped: {}", "⚠".yellow(), committed);
            }
            return Err(e.into());
        }
    };

    print_summary(&report);

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_event(event: RunEvent<'_>, show_diff: bool, dry_run: bool) {
    match event {
        RunEvent::BackupCreated { path } => {
            println!("Backup: {}", path.display());
            println!();
        }
        RunEvent::ModuleStarted { name, operations } => {
            println!("{} ({} operation(s))", name.bold(), operations);
        }
        RunEvent::Validated { .. } => {
            println!("  {}", "all patterns found".dimmed());
        }
        RunEvent::OperationApplied { op, .. } => {
            println!(
                "  {} operation #{}: {} replacement(s)",
                "✓".green(),
                op.index,
                op.matches
            );
        }
        RunEvent::Changed {
            name, before, after, ..
        } => {
            if show_diff {
                display_diff(name, before, after);
            }
        }
        RunEvent::Finished { outcome } => print_outcome(outcome, dry_run),
    }
}

fn print_outcome(outcome: &PatchOutcome, dry_run: bool) {
    match outcome.status {
        OutcomeStatus::Applied => {
            let verb = if dry_run { "Would apply" } else { "Applied" };
            println!("{} {}: {} - {}", "✓".green(), outcome.module_name, verb, outcome.detail);
        }
        OutcomeStatus::Skipped => {
            println!("{} {}: Skipped ({})", "⊘".cyan(), outcome.module_name, outcome.detail);
        }
        OutcomeStatus::ValidationFailed => {
            eprintln!("{} {}: Validation failed", "✗".red(), outcome.module_name);
            eprintln!("  {}", outcome.detail);
            eprintln!("  Possible causes:");
            eprintln!("    - The target is a different version than the catalog expects");
            eprintln!("    - The module was already applied");
        }
        OutcomeStatus::SubstitutionFailed => {
            eprintln!("{} {}: Substitution failed", "✗".red(), outcome.module_name);
            eprintln!("  {}", outcome.detail);
            eprintln!("  {}", "Module changes discarded, target untouched".dimmed());
        }
        OutcomeStatus::Unknown => {
            eprintln!("{} {}: {}", "✗".red(), outcome.module_name, outcome.detail);
        }
    }
    println!();
}

fn print_summary(report: &RunReport) {
    println!("{}", "Summary:".bold());
    println!(
        "  {} {}",
        format!("{}", report.applied_count()).green(),
        if report.dry_run { "would apply" } else { "applied" }
    );
    let applied = join_names(report.applied());
    if !applied.is_empty() {
        println!("    {}", applied.dimmed());
    }

    let skipped_count = report.skipped().count();
    if skipped_count > 0 {
        println!("  {} skipped", format!("{}", skipped_count).cyan());
        println!("    {}", join_names(report.skipped()).dimmed());
    }

    println!("  {} failed", format!("{}", report.failed_count()).red());
    let failed = join_names(report.failed());
    if !failed.is_empty() {
        println!("    {}", failed.dimmed());
    }

    if let Some(backup) = &report.backup {
        println!("  Backup: {}", backup.display());
    }
}

fn join_names<'a>(outcomes: impl Iterator<Item = &'a PatchOutcome>) -> String {
    outcomes
        .map(|o| o.module_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Unified diff of a module's change, two lines of context per hunk.
fn display_diff(name: &str, before: &str, after: &str) {
    println!("{}", format!("--- {} (before)", name).dimmed());
    println!("{}", format!("+++ {} (after)", name).dimmed());

    let diff = TextDiff::from_lines(before, after);
    for group in diff.grouped_ops(2) {
        println!("{}", "@@".cyan());
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = truncate_line(change.value().trim_end_matches('\n'));
                match change.tag() {
                    ChangeTag::Delete => println!("{}", format!("-{}", line).red()),
                    ChangeTag::Insert => println!("{}", format!("+{}", line).green()),
                    ChangeTag::Equal => println!(" {}", line),
                }
            }
        }
    }
}

fn truncate_line(line: &str) -> String {
    if line.chars().count() <= DIFF_LINE_LIMIT {
        return line.to_string();
    }
    let head: String = line.chars().take(DIFF_LINE_LIMIT).collect();
    format!("{head}…")
}

fn cmd_list(catalog: Option<PathBuf>) -> Result<()> {
    let catalog = load_catalog(catalog)?;

    println!("{} ({} modules)", "Available modules".bold(), catalog.registry.len());
    for meta in &catalog.metas {
        if let Some(range) = meta.version_range.as_deref() {
            let label = if meta.name.is_empty() { "catalog" } else { meta.name.as_str() };
            println!("  {}", format!("{label}: version_range {range}").dimmed());
        }
    }
    println!();

    for (name, description) in catalog.registry.list_all() {
        let ops = catalog
            .registry
            .lookup(name)
            .map(|m| m.operations().len())
            .unwrap_or(0);
        println!("  {} {}", name.green(), format!("({ops} operation(s))").dimmed());
        if !description.is_empty() {
            println!("      {}", description);
        }
    }

    Ok(())
}

fn cmd_restore(target: &Path, backup: Option<PathBuf>) -> Result<()> {
    let backup = match backup {
        Some(path) => path,
        None => match latest_backup(target)? {
            Some(path) => path,
            None => anyhow::bail!("No backups found for {}", target.display()),
        },
    };

    restore(&backup, target)?;
    println!(
        "{} Restored {} from {}",
        "✓".green(),
        target.display(),
        backup.display()
    );
    Ok(())
}
