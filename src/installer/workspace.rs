//! Staging workspace for downloaded archives.
//!
//! Archives are downloaded under timestamped names so concurrent and
//! repeated runs never collide. Anything that outlives a run is garbage:
//! non-zip files are orphans from interrupted downloads, and `.tmp`,
//! `.part` and `.download` files are strays from other tooling.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

/// Extensions treated as stray partial downloads.
const STRAY_EXTENSIONS: [&str; 3] = ["tmp", "part", "download"];

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn create(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unique staging path for one archive. Multipart archives carry their
    /// part number in the name.
    pub fn part_path(&self, entry_id: &str, part: Option<usize>) -> PathBuf {
        let ts = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let name = match part {
            Some(n) => format!("{entry_id}_Part{n}_{ts}.zip"),
            None => format!("{entry_id}_{ts}.zip"),
        };
        self.dir.join(name)
    }

    /// Files left behind by interrupted runs: anything that is not a zip.
    pub fn orphaned_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut orphans = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && !has_extension(&path, "zip") {
                orphans.push(path);
            }
        }
        Ok(orphans)
    }

    pub fn remove_orphans(&self) -> io::Result<usize> {
        let orphans = self.orphaned_files()?;
        let count = orphans.len();
        for path in orphans {
            debug!("removing orphaned file {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(count)
    }

    /// Best-effort sweep of stray partial-download files. Errors are logged
    /// and swallowed; a locked stray must not fail the run.
    pub fn cleanup_stray(&self) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("could not scan {} for strays: {e}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_stray = path.is_file()
                && STRAY_EXTENSIONS.iter().any(|ext| has_extension(&path, ext));
            if is_stray {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("could not remove stray {}: {e}", path.display());
                }
            }
        }
    }
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_paths_are_unique_and_well_formed() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path().join("stage")).unwrap();
        let a = ws.part_path("EP01", None);
        let b = ws.part_path("EP01", None);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("EP01_"));
        assert!(name.ends_with(".zip"));
        let part = ws.part_path("EP01", Some(2));
        assert!(part
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("EP01_Part2_"));
    }

    #[test]
    fn orphan_scan_skips_zips_and_directories() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        std::fs::write(root.path().join("keep.zip"), b"z").unwrap();
        std::fs::write(root.path().join("leftover.bin"), b"b").unwrap();
        std::fs::write(root.path().join("noext"), b"n").unwrap();
        std::fs::create_dir(root.path().join("subdir")).unwrap();

        let mut orphans: Vec<_> = ws
            .orphaned_files()
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        orphans.sort();
        assert_eq!(orphans, ["leftover.bin", "noext"]);

        assert_eq!(ws.remove_orphans().unwrap(), 2);
        assert!(root.path().join("keep.zip").exists());
        assert!(!root.path().join("leftover.bin").exists());
    }

    #[test]
    fn stray_sweep_targets_partial_download_extensions() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        std::fs::write(root.path().join("a.tmp"), b"t").unwrap();
        std::fs::write(root.path().join("b.PART"), b"p").unwrap();
        std::fs::write(root.path().join("c.download"), b"d").unwrap();
        std::fs::write(root.path().join("keep.zip"), b"z").unwrap();

        ws.cleanup_stray();
        assert!(!root.path().join("a.tmp").exists());
        assert!(!root.path().join("b.PART").exists());
        assert!(!root.path().join("c.download").exists());
        assert!(root.path().join("keep.zip").exists());
    }
}
