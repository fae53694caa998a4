//! Archive integrity checking and extraction.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::EngineError;

/// Structural validity check: the file opens as a zip container and holds at
/// least one entry. Every parse or I/O failure maps to `false`.
///
/// No checksum manifest exists for DLC archives, so truncation that still
/// yields a valid central directory is not detectable here.
pub fn is_valid_archive(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    match zip::ZipArchive::new(BufReader::new(file)) {
        Ok(archive) => archive.len() > 0,
        Err(e) => {
            debug!("archive {} failed to parse: {e}", path.display());
            false
        }
    }
}

/// Unpack every entry of `archive_path` under `dest_root`.
///
/// Directory structure is recreated as needed and existing files are
/// overwritten unconditionally. Pure directory markers are skipped; their
/// directories are created when a file entry requires them. Entries whose
/// resolved path would escape `dest_root` abort the extraction. There is no
/// rollback: files already written stay in place on failure.
pub fn extract(archive_path: &Path, dest_root: &Path) -> Result<(), EngineError> {
    let file = File::open(archive_path).map_err(|e| {
        EngineError::Extraction(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|_| EngineError::CorruptArchive(archive_path.to_path_buf()))?;

    std::fs::create_dir_all(dest_root).map_err(|e| disk_write(dest_root, &e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|_| EngineError::CorruptArchive(archive_path.to_path_buf()))?;

        let raw_name = entry.name().to_string();
        if entry.is_dir() || raw_name.is_empty() {
            continue;
        }

        let rel = sanitize_entry_path(&raw_name).ok_or_else(|| {
            warn!("rejecting archive entry escaping destination: {raw_name}");
            EngineError::Extraction(format!("entry escapes destination: {raw_name}"))
        })?;

        let dest = dest_root.join(rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| disk_write(parent, &e))?;
        }

        let mut out = File::create(&dest).map_err(|e| disk_write(&dest, &e))?;
        io::copy(&mut entry, &mut out).map_err(|e| disk_write(&dest, &e))?;
    }

    Ok(())
}

/// Resolve an archive entry name to a safe relative path.
///
/// Treats both separators as such (zips written on Windows use `\`), drops
/// `.` components, and rejects absolute paths, drive prefixes, and any `..`
/// component.
fn sanitize_entry_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let candidate = Path::new(&normalized);

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn disk_write(path: &Path, e: &io::Error) -> EngineError {
    EngineError::DiskWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
