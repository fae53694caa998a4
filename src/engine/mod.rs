//! Download engine: HTTP transfers, concurrency limiting, progress, control.

pub mod control;
pub mod http;
pub mod progress;
pub mod queue;

pub use control::{CancellationToken, PauseFlag};
pub use http::{download, HttpClient};
pub use progress::{NoopSink, ProgressSink, ProgressUpdate};
pub use queue::DownloadQueue;
