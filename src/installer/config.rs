//! Installer configuration.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default cap on simultaneously active downloads.
pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("install root does not exist: {}", .0.display())]
    InstallRootNotFound(PathBuf),
    #[error("max concurrent downloads must be at least 1")]
    ZeroConcurrency,
}

/// Where installs land and how downloads are staged.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Game directory that receives extracted content.
    pub install_root: PathBuf,
    /// Staging area for downloaded archives.
    pub temp_dir: PathBuf,
    pub max_concurrent_downloads: usize,
}

impl InstallConfig {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            temp_dir: std::env::temp_dir().join("dlckit"),
            max_concurrent_downloads: DEFAULT_CONCURRENT_DOWNLOADS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.install_root.is_dir() {
            return Err(ConfigError::InstallRootNotFound(self.install_root.clone()));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Heuristic check that the install root is actually a game directory:
    /// a real one carries both `Game/` and `Data/` subdirectories.
    pub fn looks_like_game_dir(&self) -> bool {
        looks_like_game_dir(&self.install_root)
    }
}

pub fn looks_like_game_dir(path: &Path) -> bool {
    path.join("Game").is_dir() && path.join("Data").is_dir()
}
