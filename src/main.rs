//! dlckit - DLC download and installation toolkit
//!
//! Fetches a catalog, downloads the selected packs through a bounded
//! download queue, validates and extracts them into the game directory,
//! and reconciles what is actually on disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use dlckit::catalog::{Catalog, CatalogEntry};
use dlckit::engine::{CancellationToken, HttpClient, PauseFlag, ProgressSink, ProgressUpdate};
use dlckit::installer::{free_space, InstallConfig, Orchestrator, RunReport, RunState};
use dlckit::reconcile::{self, InstallStatus};

#[derive(Parser)]
#[command(name = "dlckit")]
#[command(version)]
#[command(about = "DLC download and installation toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install packs from a catalog
    Install {
        /// Catalog URL or path to a catalog JSON file
        catalog: String,

        /// Pack ids to install (omit with --all to install everything)
        ids: Vec<String>,

        /// Game installation directory
        #[arg(short, long)]
        game: PathBuf,

        /// Maximum concurrent downloads
        #[arg(short, long)]
        concurrent: Option<usize>,

        /// Staging directory for downloaded archives
        #[arg(long)]
        temp: Option<PathBuf>,

        /// Install every pack that is not already installed
        #[arg(long)]
        all: bool,
    },

    /// Remove installed packs
    Uninstall {
        /// Catalog URL or path to a catalog JSON file
        catalog: String,

        /// Pack ids to remove
        ids: Vec<String>,

        /// Game installation directory
        #[arg(short, long)]
        game: PathBuf,
    },

    /// Show the install state of every catalog pack
    Status {
        /// Catalog URL or path to a catalog JSON file
        catalog: String,

        /// Game installation directory
        #[arg(short, long)]
        game: PathBuf,
    },

    /// Show information about a catalog
    CatalogInfo {
        /// Catalog URL or path to a catalog JSON file
        catalog: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only initialize logging if verbose or RUST_LOG is set
    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "dlckit=debug".parse()? } else { "dlckit=warn".parse()? }),
            )
            .init();
    }

    match cli.command {
        Commands::Install {
            catalog,
            ids,
            game,
            concurrent,
            temp,
            all,
        } => {
            let mut config = InstallConfig::new(&game);
            if let Some(n) = concurrent {
                config.max_concurrent_downloads = n;
            }
            if let Some(dir) = temp {
                config.temp_dir = dir;
            }

            if !config.looks_like_game_dir() {
                println!(
                    "Warning: {} does not look like a game directory (no Game/ and Data/ subdirs)",
                    game.display()
                );
            }

            let orchestrator = Orchestrator::new(config)?;
            let catalog = load_catalog(orchestrator.http(), &catalog).await?;
            let entries = select_entries(&catalog, &ids, all, &game)?;
            if entries.is_empty() {
                println!("Nothing to install.");
                return Ok(());
            }

            // Interrupted runs leave non-zip leftovers in the staging dir.
            let removed = orchestrator.workspace().remove_orphans()?;
            if removed > 0 {
                println!("Removed {removed} leftover file(s) from the staging directory");
            }

            if let Some(free) = free_space(&game) {
                println!("Free space on target volume: {:.1} GB", free as f64 / 1e9);
            }
            println!(
                "Installing {} pack(s), {} concurrent download(s)\n",
                entries.len(),
                orchestrator.config().max_concurrent_downloads
            );

            let token = CancellationToken::new();
            let pause = PauseFlag::new();
            let interrupt = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!("\nCancelling after the current chunk...");
                    interrupt.cancel();
                }
            });

            let sink = CliSink::new();
            let report = orchestrator.install(&entries, &sink, &token, &pause).await;
            sink.finish();
            print_report("Install", &report);
        }

        Commands::Uninstall { catalog, ids, game } => {
            if ids.is_empty() {
                bail!("no pack ids given");
            }
            let orchestrator = Orchestrator::new(InstallConfig::new(&game))?;
            let catalog = load_catalog(orchestrator.http(), &catalog).await?;
            let entries = resolve_ids(&catalog, &ids)?;
            let report = orchestrator.uninstall(&entries);
            print_report("Uninstall", &report);
        }

        Commands::Status { catalog, game } => {
            let http = HttpClient::new()?;
            let catalog = load_catalog(&http, &catalog).await?;
            println!("{:<12} {:<14} NAME", "ID", "STATUS");
            for entry in catalog.entries() {
                let status = reconcile::classify(&entry.id, &game);
                println!("{:<12} {:<14} {}", entry.id, status.to_string(), entry.name);
            }
        }

        Commands::CatalogInfo { catalog } => {
            let http = HttpClient::new()?;
            let catalog = load_catalog(&http, &catalog).await?;
            println!("=== Catalog ===");
            println!("Packs: {}", catalog.len());
            for entry in catalog.entries() {
                let parts = if entry.is_multipart() {
                    format!(" ({} parts)", entry.sources.len())
                } else {
                    String::new()
                };
                println!("  {:<12} {}{}", entry.id, entry.name, parts);
            }
        }
    }

    Ok(())
}

/// Load a catalog from an HTTP(S) URL or a local JSON file.
async fn load_catalog(http: &HttpClient, source: &str) -> Result<Catalog> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Catalog::fetch(http, source).await
    } else {
        let json = std::fs::read_to_string(source)
            .with_context(|| format!("could not read catalog file {source}"))?;
        Catalog::from_json(&json)
    }
}

fn resolve_ids(catalog: &Catalog, ids: &[String]) -> Result<Vec<CatalogEntry>> {
    ids.iter()
        .map(|id| {
            catalog
                .get(id)
                .cloned()
                .with_context(|| format!("unknown pack id: {id}"))
        })
        .collect()
}

/// Pick the entries to install, skipping anything already installed.
fn select_entries(
    catalog: &Catalog,
    ids: &[String],
    all: bool,
    game: &std::path::Path,
) -> Result<Vec<CatalogEntry>> {
    let candidates = if all {
        catalog.entries().to_vec()
    } else {
        if ids.is_empty() {
            bail!("no pack ids given (use --all to install everything)");
        }
        resolve_ids(catalog, ids)?
    };

    let mut selected = Vec::new();
    for entry in candidates {
        match reconcile::classify(&entry.id, game) {
            InstallStatus::Installed => {
                println!("Skipping {} (already installed)", entry.id);
            }
            _ => selected.push(entry),
        }
    }
    Ok(selected)
}

fn print_report(verb: &str, report: &RunReport) {
    println!("\n=== {verb} Summary ===");
    println!("State:     {}", report.state);
    println!("Attempted: {}", report.attempted);
    println!("Succeeded: {}", report.succeeded);
    println!("Failed:    {}", report.failed.len());
    for failure in &report.failed {
        println!("  - {}: {}", failure.id, failure.message);
    }
    if report.state == RunState::Completed && report.succeeded > 0 {
        println!("\nDone!");
    }
}

/// Terminal progress reporting for transfers.
struct CliSink {
    bar: ProgressBar,
    length_known: AtomicBool,
}

impl CliSink {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        Self {
            bar,
            length_known: AtomicBool::new(false),
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for CliSink {
    fn on_progress(&self, update: ProgressUpdate) {
        // A byte count below the bar's position means a new transfer began
        // (the next part of a multipart pack); take its total instead of
        // reusing the previous one.
        if update.bytes < self.bar.position() {
            self.length_known.store(false, Ordering::Relaxed);
        }
        if let Some(total) = update.total {
            if !self.length_known.swap(true, Ordering::Relaxed) {
                self.bar.set_length(total);
            }
        }
        self.bar.set_position(update.bytes);

        let speed = update
            .speed_mbps
            .map(|s| format!("{s:.1} MB/s"))
            .unwrap_or_default();
        let eta = update
            .eta
            .map(|eta| {
                let secs = eta.as_secs();
                format!(" ETA {:02}:{:02}", secs / 60, secs % 60)
            })
            .unwrap_or_default();
        self.bar.set_message(format!("{speed}{eta}"));
    }

    fn on_log(&self, message: &str) {
        // Reset per-transfer state when a new pack starts.
        if message.starts_with("Installing ") {
            self.length_known.store(false, Ordering::Relaxed);
            self.bar.set_length(0);
            self.bar.set_position(0);
        }
        self.bar.println(message);
    }
}
