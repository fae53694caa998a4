//! Batch installation orchestrator.
//!
//! Drives the full pipeline for a set of catalog entries: stage archives
//! through the download queue, validate each archive as soon as it lands,
//! extract in source order into the install root, and clean up staged files
//! on every exit path. One entry failing never stops the batch; only
//! cancellation does.

pub mod config;
pub mod workspace;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::archive;
use crate::catalog::CatalogEntry;
use crate::engine::{download, CancellationToken, DownloadQueue, HttpClient, PauseFlag, ProgressSink};
use crate::error::EngineError;
use crate::reconcile;

pub use config::{ConfigError, InstallConfig};
pub use workspace::Workspace;

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed,
    Cancelled,
    CompletedWithErrors,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::CompletedWithErrors => "completed with errors",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct EntryFailure {
    pub id: String,
    pub message: String,
}

/// Outcome of a batch run. `attempted` counts entries that were actually
/// started; entries skipped by cancellation are not attempted.
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<EntryFailure>,
}

pub struct Orchestrator {
    config: InstallConfig,
    http: HttpClient,
    queue: DownloadQueue,
    workspace: Workspace,
}

impl Orchestrator {
    pub fn new(config: InstallConfig) -> Result<Self> {
        config.validate().context("invalid install configuration")?;
        let workspace = Workspace::create(&config.temp_dir).with_context(|| {
            format!("could not create staging dir {}", config.temp_dir.display())
        })?;
        let http = HttpClient::new().context("could not build HTTP client")?;
        let queue = DownloadQueue::new(config.max_concurrent_downloads);
        Ok(Self {
            config,
            http,
            queue,
            workspace,
        })
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Install a batch of entries.
    ///
    /// Entries are processed in order. A failed entry is recorded and the
    /// batch moves on; cancellation stops the batch and skips everything
    /// not yet started. Staged archives are always deleted, whether the
    /// entry succeeded, failed, or was cancelled mid-transfer.
    pub async fn install(
        &self,
        entries: &[CatalogEntry],
        sink: &dyn ProgressSink,
        token: &CancellationToken,
        pause: &PauseFlag,
    ) -> RunReport {
        let mut report = RunReport {
            state: RunState::Completed,
            attempted: 0,
            succeeded: 0,
            failed: Vec::new(),
        };

        for entry in entries {
            if token.is_cancelled() {
                report.state = RunState::Cancelled;
                break;
            }
            report.attempted += 1;
            sink.on_log(&format!("Installing {} ({})", entry.name, entry.id));

            match self.install_entry(entry, sink, token, pause).await {
                Ok(()) => {
                    info!("installed {}", entry.id);
                    sink.on_log(&format!("Installed {}", entry.name));
                    report.succeeded += 1;
                }
                Err(e) if e.is_cancelled() => {
                    report.state = RunState::Cancelled;
                    break;
                }
                Err(e) => {
                    warn!("install of {} failed: {e}", entry.id);
                    sink.on_log(&format!("Failed {}: {e}", entry.name));
                    report.failed.push(EntryFailure {
                        id: entry.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if report.state != RunState::Cancelled && !report.failed.is_empty() {
            report.state = RunState::CompletedWithErrors;
        }
        self.workspace.cleanup_stray();
        report
    }

    /// Install one entry, deleting its staged archives on every exit path.
    async fn install_entry(
        &self,
        entry: &CatalogEntry,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
        pause: &PauseFlag,
    ) -> Result<(), EngineError> {
        let mut staged: Vec<PathBuf> = Vec::new();
        let result = self
            .fetch_and_extract(entry, &mut staged, sink, token, pause)
            .await;
        for path in staged {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("could not remove staged archive {}: {e}", path.display());
                }
            }
        }
        result
    }

    async fn fetch_and_extract(
        &self,
        entry: &CatalogEntry,
        staged: &mut Vec<PathBuf>,
        sink: &dyn ProgressSink,
        token: &CancellationToken,
        pause: &PauseFlag,
    ) -> Result<(), EngineError> {
        let multipart = entry.is_multipart();

        // Parts are fetched in order; each archive is validated as soon as
        // it finishes so a corrupt early part fails before later transfers.
        for (index, url) in entry.sources.iter().enumerate() {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let part = multipart.then_some(index + 1);
            let dest = self.workspace.part_path(&entry.id, part);
            staged.push(dest.clone());

            debug!("downloading {url} -> {}", dest.display());
            self.queue
                .run_one(download(&self.http, url, &dest, sink, token, pause))
                .await?;

            if !archive::is_valid_archive(&dest) {
                return Err(EngineError::CorruptArchive(dest));
            }
        }

        for path in staged.iter() {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let archive_path = path.clone();
            let dest_root = self.config.install_root.clone();
            tokio::task::spawn_blocking(move || archive::extract(&archive_path, &dest_root))
                .await
                .map_err(|e| EngineError::Extraction(format!("extraction task failed: {e}")))??;
        }

        Ok(())
    }

    /// Remove the content and installer-mirror trees of each entry.
    pub fn uninstall(&self, entries: &[CatalogEntry]) -> RunReport {
        let mut report = RunReport {
            state: RunState::Completed,
            attempted: 0,
            succeeded: 0,
            failed: Vec::new(),
        };

        for entry in entries {
            report.attempted += 1;
            let content = self.config.install_root.join(&entry.id);
            let mirror = reconcile::installer_mirror_dir(&self.config.install_root, &entry.id);

            let mut failure = None;
            for dir in [&content, &mirror] {
                if dir.is_dir() {
                    if let Err(e) = std::fs::remove_dir_all(dir) {
                        failure = Some(format!("could not remove {}: {e}", dir.display()));
                    }
                }
            }

            match failure {
                None => {
                    info!("uninstalled {}", entry.id);
                    report.succeeded += 1;
                }
                Some(message) => {
                    warn!("uninstall of {} failed: {message}", entry.id);
                    report.failed.push(EntryFailure {
                        id: entry.id.clone(),
                        message,
                    });
                }
            }
        }

        if !report.failed.is_empty() {
            report.state = RunState::CompletedWithErrors;
        }
        report
    }
}

/// Free bytes on the volume holding `path`, if the platform reports it.
/// Advisory only; installs proceed regardless.
pub fn free_space(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}
