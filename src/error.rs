//! Engine error taxonomy.

use std::path::PathBuf;

/// Errors surfaced by the download and installation engine.
///
/// `Cancelled` is deliberately its own variant: the orchestrator aborts the
/// whole batch on cancellation instead of recording a per-entry failure, so
/// it must never be mistaken for one.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {detail}")]
    HttpStatus { status: u16, detail: String },

    #[error("disk write failed for {}: {detail}", path.display())]
    DiskWrite { path: PathBuf, detail: String },

    #[error("corrupted archive: {}", .0.display())]
    CorruptArchive(PathBuf),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// True when the error is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
