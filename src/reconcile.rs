//! Install-state classification for catalog entries.
//!
//! A fully installed entry leaves two directory trees behind: the content
//! itself at `{install_root}/{id}` and the installer mirror at
//! `{install_root}/__Installer/DLC/{id}`. Classification is a pure read of
//! those trees and never writes or deletes anything.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Directory alongside the game content that mirrors installer metadata.
pub const INSTALLER_MIRROR: &str = "__Installer";

/// On-disk install state of one catalog entry. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStatus {
    NotInstalled,
    /// Content present but the installer mirror is missing.
    Incomplete,
    /// Installer mirror present but the content is missing.
    Corrupted,
    Installed,
    /// Classification could not be determined (filesystem error).
    Unknown,
}

impl InstallStatus {
    /// Entries in this state need (re-)installation.
    pub fn needs_install(&self) -> bool {
        !matches!(self, InstallStatus::Installed)
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstallStatus::NotInstalled => "Not Installed",
            InstallStatus::Incomplete => "Incomplete",
            InstallStatus::Corrupted => "Corrupted",
            InstallStatus::Installed => "Installed",
            InstallStatus::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Path of the installer mirror directory for an entry.
pub fn installer_mirror_dir(install_root: &Path, entry_id: &str) -> PathBuf {
    install_root.join(INSTALLER_MIRROR).join("DLC").join(entry_id)
}

/// Classify the install state of `entry_id` under `install_root`.
///
/// Both trees present reads as `Installed`. The recursive file-name-set
/// comparison between the two trees is computed and logged when the sets
/// differ, but does not change the outcome; reinstalling over mismatched
/// content is the supported repair path.
pub fn classify(entry_id: &str, install_root: &Path) -> InstallStatus {
    if entry_id.trim().is_empty() {
        return InstallStatus::NotInstalled;
    }

    let root_dir = install_root.join(entry_id);
    let mirror_dir = installer_mirror_dir(install_root, entry_id);

    match (root_dir.is_dir(), mirror_dir.is_dir()) {
        (false, false) => InstallStatus::NotInstalled,
        (true, false) => InstallStatus::Incomplete,
        (false, true) => InstallStatus::Corrupted,
        (true, true) => {
            let root_names = match file_name_set(&root_dir) {
                Ok(names) => names,
                Err(_) => return InstallStatus::Unknown,
            };
            let mirror_names = match file_name_set(&mirror_dir) {
                Ok(names) => names,
                Err(_) => return InstallStatus::Unknown,
            };
            if root_names != mirror_names {
                debug!(
                    "file sets differ for {entry_id}: {} content vs {} mirror files",
                    root_names.len(),
                    mirror_names.len()
                );
            }
            InstallStatus::Installed
        }
    }
}

/// Case-insensitive set of file base names found recursively under `dir`.
/// Subdirectory structure is deliberately ignored.
fn file_name_set(dir: &Path) -> io::Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            names.insert(entry.file_name().to_string_lossy().to_lowercase());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn neither_tree_means_not_installed() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(classify("EP01", root.path()), InstallStatus::NotInstalled);
    }

    #[test]
    fn content_without_mirror_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("EP01")).unwrap();
        assert_eq!(classify("EP01", root.path()), InstallStatus::Incomplete);
    }

    #[test]
    fn mirror_without_content_is_corrupted() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(installer_mirror_dir(root.path(), "EP01")).unwrap();
        assert_eq!(classify("EP01", root.path()), InstallStatus::Corrupted);
    }

    #[test]
    fn both_trees_read_installed() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("EP01/data/pack.bin"));
        touch(&installer_mirror_dir(root.path(), "EP01").join("pack.bin"));
        assert_eq!(classify("EP01", root.path()), InstallStatus::Installed);
    }

    #[test]
    fn mismatched_file_sets_still_read_installed() {
        // The name-set comparison is observational only; differing trees do
        // not demote the status.
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("EP01/a.bin"));
        touch(&root.path().join("EP01/b.bin"));
        touch(&installer_mirror_dir(root.path(), "EP01").join("c.bin"));
        assert_eq!(classify("EP01", root.path()), InstallStatus::Installed);
    }

    #[test]
    fn name_comparison_ignores_structure_and_case() {
        let a = tempfile::tempdir().unwrap();
        touch(&a.path().join("deep/nested/File.TXT"));
        let b = tempfile::tempdir().unwrap();
        touch(&b.path().join("file.txt"));
        assert_eq!(
            file_name_set(a.path()).unwrap(),
            file_name_set(b.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_content_tree_reads_unknown() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("EP01/locked/a.bin"));
        touch(&installer_mirror_dir(root.path(), "EP01").join("a.bin"));

        let locked = root.path().join("EP01/locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Mode 000 does not bind for root; nothing to assert in that case.
        let enforced = std::fs::read_dir(&locked).is_err();

        let status = classify("EP01", root.path());

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if enforced {
            assert_eq!(status, InstallStatus::Unknown);
        }
    }

    #[test]
    fn blank_id_never_touches_disk() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(classify("  ", root.path()), InstallStatus::NotInstalled);
    }
}
