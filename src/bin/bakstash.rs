//! # bakstash CLI - Inspect and manage document backups
//!
//! A small administration tool over the bakstash library. Editors use the
//! library directly; this binary is for looking at and recovering backups
//! from a shell.
//!
//! ## Usage
//! ```bash
//! # Show the identifier that namespaces a document's backups
//! bakstash id refs.bib
//!
//! # List all backups of a document, oldest first
//! bakstash list refs.bib
//!
//! # Does the latest backup hold anything the saved file does not?
//! bakstash differs refs.bib
//!
//! # Back up the saved file now, then restore it later
//! bakstash backup refs.bib
//! bakstash restore refs.bib
//! ```

use anyhow::{bail, Context, Result};
use bakstash::diff::{backup_file_differs, content_differs_from_latest_backup};
use bakstash::writer::{restore_latest_backup, write_backup};
use bakstash::{identifier_for, list_backups, most_recent_backup, BackupConfig, FileDocument};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

/// bakstash CLI - Automatic document backups
#[derive(Parser)]
#[command(name = "bakstash")]
#[command(version)]
#[command(about = "Inspect, create and restore versioned document backups")]
#[command(long_about = None)]
struct Cli {
    /// Backup directory (overrides the configuration)
    #[arg(short, long, global = true)]
    backup_dir: Option<PathBuf>,

    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the backup identifier of a document
    Id {
        /// Document path
        file: PathBuf,
    },

    /// List the backups of a document
    #[command(alias = "ls")]
    List {
        /// Document path
        file: PathBuf,

        /// Show only the newest N backups
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the path of the most recent backup
    Latest {
        /// Document path
        file: PathBuf,
    },

    /// Check whether the latest backup differs from the saved document
    Differs {
        /// Document path
        file: PathBuf,
    },

    /// Back up the saved document now
    Backup {
        /// Document path
        file: PathBuf,

        /// Write even if the latest backup has the same content
        #[arg(short, long)]
        force: bool,
    },

    /// Replace the document with its most recent backup
    Restore {
        /// Document path
        file: PathBuf,

        /// Restore even if the document was saved after the backup
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.backup_dir)?;
    let backup_dir = config.backup_directory.clone();

    match cli.command {
        Commands::Id { file } => cmd_id(&file),
        Commands::List { file, limit } => cmd_list(&file, &backup_dir, limit),
        Commands::Latest { file } => cmd_latest(&file, &backup_dir),
        Commands::Differs { file } => cmd_differs(&file, &backup_dir),
        Commands::Backup { file, force } => cmd_backup(&file, &backup_dir, force),
        Commands::Restore { file, force } => cmd_restore(&file, &backup_dir, force),
        Commands::Config => cmd_config(&config),
    }
}

/// Read the configuration file, if any, and apply command line overrides
fn load_config(path: Option<&Path>, backup_dir: Option<PathBuf>) -> Result<BackupConfig> {
    let mut config = match path {
        Some(path) => BackupConfig::load(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => BackupConfig::default(),
    };
    if let Some(dir) = backup_dir {
        config.backup_directory = dir;
    }
    Ok(config)
}

/// Make a document path absolute so it hashes like it does in the editor
fn absolute(file: &Path) -> Result<PathBuf> {
    std::path::absolute(file).with_context(|| format!("cannot resolve {}", file.display()))
}

fn cmd_id(file: &Path) -> Result<()> {
    let file = absolute(file)?;
    println!("{}", identifier_for(&file));
    Ok(())
}

/// List all backups of a document
///
/// Oldest first, so the last line is the backup `restore` would use.
fn cmd_list(file: &Path, backup_dir: &Path, limit: Option<usize>) -> Result<()> {
    let file = absolute(file)?;
    let backups = list_backups(&file, backup_dir)?;

    if backups.is_empty() {
        println!("{}", "No backups found.".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "Backups of".blue().bold(),
        file.display().to_string().cyan()
    );
    println!();

    let skip = limit.map_or(0, |n| backups.len().saturating_sub(n));
    for entry in backups.iter().skip(skip) {
        let size = fs::metadata(&entry.path).map(|m| m.len()).unwrap_or(0);
        let age = entry.modified.map(format_age).unwrap_or_else(|| "unknown".to_string());

        print!("  {} ", entry.record.timestamp.to_string().yellow());
        print!("{} ", format_bytes(size).cyan());
        println!("{}", format!("({} ago)", age).dimmed());
    }

    if skip > 0 {
        println!(
            "\n{}",
            format!("Showing {} of {} backups", backups.len() - skip, backups.len()).dimmed()
        );
    }

    Ok(())
}

fn cmd_latest(file: &Path, backup_dir: &Path) -> Result<()> {
    let file = absolute(file)?;
    match most_recent_backup(&file, backup_dir)? {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", "No backups found.".yellow()),
    }
    Ok(())
}

fn cmd_differs(file: &Path, backup_dir: &Path) -> Result<()> {
    let file = absolute(file)?;
    if backup_file_differs(&file, backup_dir)? {
        println!("{} latest backup differs from {}", "!".yellow().bold(), file.display());
    } else {
        println!("{} latest backup matches {}", "✓".green().bold(), file.display());
    }
    Ok(())
}

/// One-shot backup of the saved file
fn cmd_backup(file: &Path, backup_dir: &Path, force: bool) -> Result<()> {
    let file = absolute(file)?;
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }

    let document = FileDocument::new(&file).handle();
    let content = document.content()?;
    if !force && !content_differs_from_latest_backup(&content, &file, backup_dir)? {
        println!("{} latest backup is already up to date", "✓".green().bold());
        return Ok(());
    }

    let path = write_backup(&document, backup_dir)
        .with_context(|| format!("cannot back up {}", file.display()))?;
    println!("{} Wrote backup", "✓".green().bold());
    println!("  Path: {}", path.display().to_string().cyan());
    println!("  Size: {}", format_bytes(content.len() as u64).cyan());
    Ok(())
}

/// Restore the most recent backup over the document
fn cmd_restore(file: &Path, backup_dir: &Path, force: bool) -> Result<()> {
    let file = absolute(file)?;
    if !force && file.exists() && !backup_file_differs(&file, backup_dir)? {
        println!(
            "{} nothing to restore: the document is at least as new as its latest backup",
            "✓".green().bold()
        );
        println!("  Use {} to restore anyway", "--force".yellow());
        return Ok(());
    }

    match restore_latest_backup(&file, backup_dir)
        .with_context(|| format!("cannot restore {}", file.display()))?
    {
        Some(backup) => {
            println!("{} Restored {}", "✓".green().bold(), file.display().to_string().cyan());
            println!("  From: {}", backup.display().to_string().dimmed());
        }
        None => println!("{}", "No backups found.".yellow()),
    }
    Ok(())
}

fn cmd_config(config: &BackupConfig) -> Result<()> {
    println!("{}", "Configuration:".blue().bold());
    println!("  Backup directory: {}", config.backup_directory.display().to_string().cyan());
    println!("  Backups enabled: {}", config.backups_enabled);
    println!("  Warn before overwrite: {}", config.warn_before_overwrite);
    println!("  Debounce: {}", format_duration(config.debounce()).to_string().cyan());
    println!("  Final backup on close: {}", if config.force_final_backup { "always" } else { "when dirty" });
    match config.max_backups {
        Some(max) => println!("  Retention: newest {} per document", max),
        None => println!("  Retention: keep all"),
    }
    Ok(())
}

/// Age of a file, rounded to whole seconds
fn format_age(modified: SystemTime) -> String {
    let elapsed = SystemTime::now().duration_since(modified).unwrap_or_default();
    format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
