//! CLI definition and dispatch for the `mts` binary.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::catalog::sqlite::SqliteCatalog;
use crate::catalog::store::CatalogStore;
use crate::core::config::{CategoryConfig, Config};
use crate::core::errors::{MtsError, Result};
use crate::logger::{EventType, LogEntry, ScanLogger, Severity};
use crate::reconcile::{Reconciler, RunReport, RunState};
use crate::scanner::{ExclusionFilter, ListingParser, TransportOutput, TreeScanner};

/// Mirror tree synchronizer.
#[derive(Debug, Parser)]
#[command(name = "mts", version, about = "Reconcile a mirror metadata catalog against a master file tree")]
pub struct MtsCli {
    /// Configuration file.
    #[arg(long, default_value = "/etc/mts/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Walk live category trees and reconcile the catalog.
    Scan {
        /// Restrict the run to one category.
        #[arg(long)]
        category: Option<String>,
    },
    /// Reconcile one category from a captured transport listing.
    ImportListing {
        /// Category the listing belongs to.
        #[arg(long)]
        category: String,
        /// File holding the transport's captured stdout.
        #[arg(long)]
        file: PathBuf,
        /// Exit code the transport reported; non-zero output is still
        /// parsed, with the degradation logged.
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
    },
}

/// Run the CLI; returns the process exit code.
pub fn run() -> i32 {
    match try_run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            1
        }
    }
}

fn try_run() -> Result<()> {
    let cli = MtsCli::parse();
    let config = Config::load(&cli.config)?;
    let mut store = SqliteCatalog::open(&config.database)?;
    let mut logger = match &config.log.file {
        Some(path) => ScanLogger::open(path),
        None => ScanLogger::stderr(),
    };

    match cli.command {
        Command::Scan { category } => {
            let selected: Vec<&CategoryConfig> = config
                .categories
                .iter()
                .filter(|c| category.as_deref().is_none_or(|name| name == c.name))
                .collect();
            if selected.is_empty() {
                return Err(MtsError::InvalidConfig {
                    details: format!("no category matches {category:?}"),
                });
            }
            for cfg in selected {
                scan_category(&mut store, cfg, &mut logger)?;
            }
            Ok(())
        }
        Command::ImportListing {
            category,
            file,
            exit_code,
        } => {
            let Some(cfg) = config.category(&category) else {
                return Err(MtsError::InvalidConfig {
                    details: format!("unknown category {category:?}"),
                });
            };
            import_listing(&mut store, cfg, &file, exit_code, &mut logger)
        }
    }
}

fn scan_category(
    store: &mut SqliteCatalog,
    cfg: &CategoryConfig,
    logger: &mut ScanLogger,
) -> Result<()> {
    let category = store.category_get_or_create(&cfg.name, &cfg.product, &cfg.topdir_name())?;
    let filter = ExclusionFilter::compile(&cfg.excludes)?;
    let mut state = RunState::load(&*store, &category)?;

    logger.log(&LogEntry::new(EventType::ScanStart, Severity::Info).category(&cfg.name));
    let snapshot =
        TreeScanner::new(&cfg.topdir, &filter).scan(&state.directory_cache, &mut state.unreadable)?;

    let reconciler = Reconciler::new(&category, Some(cfg.topdir.as_path()));
    let (_, report) = reconciler.run(store, &snapshot, state, logger)?;
    logger.log(
        &LogEntry::new(EventType::ScanComplete, Severity::Info)
            .category(&cfg.name)
            .count(snapshot.len() as u64),
    );
    print_summary(&cfg.name, snapshot.len(), &report);
    Ok(())
}

fn import_listing(
    store: &mut SqliteCatalog,
    cfg: &CategoryConfig,
    file: &std::path::Path,
    exit_code: i32,
    logger: &mut ScanLogger,
) -> Result<()> {
    let category = store.category_get_or_create(&cfg.name, &cfg.product, &cfg.topdir_name())?;
    let filter = ExclusionFilter::compile(&cfg.excludes)?;
    let state = RunState::load(&*store, &category)?;

    let stdout = fs::read(file).map_err(|source| MtsError::io(file, source))?;
    let output = TransportOutput { stdout, exit_code };

    logger.log(&LogEntry::new(EventType::ScanStart, Severity::Info).category(&cfg.name));
    let snapshot =
        ListingParser::new(&filter).parse_output(&output, &state.directory_cache, logger)?;

    // Listing runs have no local tree to hash, so checksum extraction is
    // skipped.
    let reconciler = Reconciler::new(&category, None);
    let (_, report) = reconciler.run(store, &snapshot, state, logger)?;
    logger.log(
        &LogEntry::new(EventType::ScanComplete, Severity::Info)
            .category(&cfg.name)
            .count(snapshot.len() as u64),
    );
    print_summary(&cfg.name, snapshot.len(), &report);
    Ok(())
}

fn print_summary(category: &str, seen: usize, report: &RunReport) {
    println!(
        "{} {category}: {seen} directories seen, +{} ~{} -{} directories, +{} repositories, +{} file details",
        "synced".green().bold(),
        report.directories_created,
        report.directories_updated,
        report.directories_deleted,
        report.repositories_created,
        report.file_details_created,
    );
}
