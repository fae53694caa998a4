//! HTTP transfer engine with progress, pause, and cooperative cancellation.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::engine::control::{CancellationToken, PauseFlag};
use crate::engine::progress::{ProgressSink, TransferMeter};
use crate::error::EngineError;

/// Time to establish the TCP connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while the transfer is paused.
const PAUSE_POLL: Duration = Duration::from_millis(100);

/// How many times a transfer that dropped during a pause may be
/// re-established with a byte-range request before the error surfaces.
const MAX_PAUSE_RESUMES: u32 = 4;

/// Shared HTTP client for all transfers of a run.
///
/// No overall request timeout: DLC archives are multi-gigabyte and the
/// transfer is bounded by the caller's cancellation token instead. A read
/// timeout would also trip while a paused transfer idles its stream.
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dlckit/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Download `url` to `dest`, streaming chunk by chunk.
///
/// Progress goes through `sink` at a bounded rate, never per chunk. The
/// pause flag is polled between chunks; while paused no further bytes are
/// read and the connection is left open. A transfer that drops while paused
/// is re-requested with `Range: bytes=N-` from the last confirmed byte;
/// servers that ignore the range cause a restart from zero.
///
/// Cancellation is observed at chunk granularity and returns
/// [`EngineError::Cancelled`], leaving the partial file in place for the
/// caller to delete. Failures are not retried here; retry policy belongs to
/// the orchestrator.
pub async fn download(
    client: &HttpClient,
    url: &str,
    dest: &Path,
    sink: &dyn ProgressSink,
    token: &CancellationToken,
    pause: &PauseFlag,
) -> Result<u64, EngineError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| disk_write(dest, &e))?;
    }

    let mut offset: u64 = 0;
    let mut resumes: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut request = client.inner().get(url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // CDN error pages carry the useful detail in the body.
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                detail: truncate_error(&body, status),
            });
        }

        let append = offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
        if offset > 0 && !append {
            warn!("server ignored resume range for {url}, restarting from 0");
            offset = 0;
        }

        let total = response
            .content_length()
            .map(|len| len + offset)
            .filter(|len| *len > 0);

        let mut file = if append {
            OpenOptions::new()
                .append(true)
                .open(dest)
                .await
                .map_err(|e| disk_write(dest, &e))?
        } else {
            File::create(dest).await.map_err(|e| disk_write(dest, &e))?
        };

        let mut meter = TransferMeter::new(offset, total);
        let mut stream = response.bytes_stream();
        let mut paused_here = false;

        loop {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            // Suspend byte movement while paused. Unread data sits in the
            // socket buffer; the connection itself is not aborted.
            while pause.is_paused() {
                paused_here = true;
                if token.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                tokio::time::sleep(PAUSE_POLL).await;
            }

            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    if paused_here && resumes < MAX_PAUSE_RESUMES {
                        resumes += 1;
                        warn!("transfer dropped while paused, resuming from byte {offset}: {e}");
                        break;
                    }
                    return Err(EngineError::Network(e.to_string()));
                }
                None => {
                    file.flush().await.map_err(|e| disk_write(dest, &e))?;
                    sink.on_progress(meter.sample());
                    return Ok(meter.bytes());
                }
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| disk_write(dest, &e))?;
            offset += chunk.len() as u64;
            meter.add(chunk.len() as u64);

            if meter.should_emit() {
                sink.on_progress(meter.sample());
            }
        }

        // Fell out of the chunk loop to re-request after a pause drop.
        let _ = file.flush().await;
        debug!("re-requesting {url} from offset {offset}");
    }
}

fn truncate_error(body: &str, status: reqwest::StatusCode) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unrecognized status")
            .to_string();
    }
    if trimmed.chars().count() > 100 {
        let head: String = trimmed.chars().take(97).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

fn disk_write(path: &Path, e: &std::io::Error) -> EngineError {
    EngineError::DiskWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{spawn_one, Response};
    use super::*;
    use crate::engine::progress::NoopSink;
    use std::time::Instant;

    #[tokio::test]
    async fn downloads_body_to_disk() {
        let body: Vec<u8> = (0u32..4096).map(|i| (i % 251) as u8).collect();
        let url = spawn_one(Response::ok(body.clone())).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();
        let token = CancellationToken::new();
        let pause = PauseFlag::new();

        let bytes = download(&client, &url, &dest, &NoopSink, &token, &pause)
            .await
            .unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn missing_content_length_still_streams() {
        let body = vec![7u8; 2048];
        let mut resp = Response::ok(body.clone());
        resp.content_length = false;
        let url = spawn_one(resp).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();

        let bytes = download(
            &client,
            &url,
            &dest,
            &NoopSink,
            &CancellationToken::new(),
            &PauseFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 2048);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn non_success_status_maps_to_http_error() {
        let url = spawn_one(Response::status("404 Not Found")).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();

        let err = download(
            &client,
            &url,
            &dest,
            &NoopSink,
            &CancellationToken::new(),
            &PauseFlag::new(),
        )
        .await
        .unwrap_err();

        match err {
            EngineError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_responses_surface_the_body() {
        let mut resp = Response::status("503 Service Unavailable");
        resp.body = b"origin pool exhausted, retry later".to_vec();
        let url = spawn_one(resp).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();

        let err = download(
            &client,
            &url,
            &dest,
            &NoopSink,
            &CancellationToken::new(),
            &PauseFlag::new(),
        )
        .await
        .unwrap_err();

        match err {
            EngineError::HttpStatus { status, detail } => {
                assert_eq!(status, 503);
                assert!(detail.contains("origin pool exhausted"), "detail: {detail}");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn error_detail_truncates_long_bodies_and_falls_back_when_empty() {
        let status = reqwest::StatusCode::BAD_GATEWAY;
        let long = "x".repeat(300);
        let detail = truncate_error(&long, status);
        assert_eq!(detail.chars().count(), 100);
        assert!(detail.ends_with("..."));

        assert_eq!(truncate_error("  ", status), "Bad Gateway");
    }

    #[tokio::test]
    async fn cancellation_stops_transfer_and_keeps_partial_file() {
        let body = vec![1u8; 64 * 1024];
        let url = spawn_one(Response::slow(body, 1024, Duration::from_millis(40))).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();
        let token = CancellationToken::new();
        let pause = PauseFlag::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });

        let err = download(&client, &url, &dest, &NoopSink, &token, &pause)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        // Partial file stays for the caller to clean up.
        let len = std::fs::metadata(&dest).unwrap().len();
        assert!(len > 0 && len < 64 * 1024, "partial length {len}");
    }

    #[tokio::test]
    async fn pause_suspends_byte_movement() {
        let body = vec![9u8; 8 * 1024];
        let url = spawn_one(Response::ok(body.clone())).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();
        let token = CancellationToken::new();
        let pause = PauseFlag::new();
        pause.set(true);

        let resume = pause.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            resume.set(false);
        });

        let started = Instant::now();
        let bytes = download(&client, &url, &dest, &NoopSink, &token, &pause)
            .await
            .unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert!(
            started.elapsed() >= Duration::from_millis(250),
            "transfer did not wait for unpause"
        );
    }

    #[tokio::test]
    async fn cancel_while_paused_returns_cancelled() {
        let body = vec![3u8; 4 * 1024];
        let url = spawn_one(Response::ok(body)).await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("archive.zip");
        let client = HttpClient::new().unwrap();
        let token = CancellationToken::new();
        let pause = PauseFlag::new();
        pause.set(true);

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        });

        let err = download(&client, &url, &dest, &NoopSink, &token, &pause)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
