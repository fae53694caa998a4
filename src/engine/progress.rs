//! Progress reporting: the sink interface and transfer metering.

use std::time::{Duration, Instant};

/// How often the engine invokes the progress sink during a transfer.
pub const EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Sink for engine progress and log events.
///
/// The engine never assumes an execution context. Callers marshal these
/// calls onto their own UI thread or terminal; the engine only invokes them.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
    fn on_log(&self, message: &str);
}

/// One gated progress sample.
///
/// When the total size is unknown, `percent` and `eta` are `None` and
/// `bytes` is the only meaningful (monotonically increasing) counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub bytes: u64,
    pub total: Option<u64>,
    /// 0-100, present only when the total size is known.
    pub percent: Option<f64>,
    pub speed_mbps: Option<f64>,
    pub eta: Option<Duration>,
}

/// Sink that discards everything. For headless callers and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_progress(&self, _: ProgressUpdate) {}
    fn on_log(&self, _: &str) {}
}

/// Tracks byte counts and timing for one transfer.
///
/// Throughput is smoothed by averaging over the whole transfer rather than
/// the last chunk; ETA is remaining bytes at that average rate.
#[derive(Debug)]
pub struct TransferMeter {
    started: Instant,
    last_emit: Instant,
    /// Byte count at construction (non-zero for a resumed transfer).
    /// Excluded from throughput: those bytes did not move during `started`'s
    /// elapsed window.
    initial: u64,
    bytes: u64,
    total: Option<u64>,
}

impl TransferMeter {
    pub fn new(initial: u64, total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_emit: now,
            initial,
            bytes: initial,
            total,
        }
    }

    pub fn add(&mut self, n: u64) {
        self.bytes += n;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Rate gate: true at most once per [`EMIT_INTERVAL`].
    pub fn should_emit(&mut self) -> bool {
        if self.last_emit.elapsed() >= EMIT_INTERVAL {
            self.last_emit = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn sample(&self) -> ProgressUpdate {
        let elapsed = self.started.elapsed().as_secs_f64();
        let moved = self.bytes - self.initial;
        let speed_bps = if elapsed > 0.0 {
            moved as f64 / elapsed
        } else {
            0.0
        };
        let speed_mbps = (speed_bps > 0.0).then(|| speed_bps / (1024.0 * 1024.0));
        let percent = self
            .total
            .map(|t| ((self.bytes as f64 / t as f64) * 100.0).min(100.0));
        let eta = match self.total {
            Some(t) if speed_bps > 0.0 && t > self.bytes => {
                Some(Duration::from_secs_f64((t - self.bytes) as f64 / speed_bps))
            }
            Some(_) if speed_bps > 0.0 => Some(Duration::ZERO),
            _ => None,
        };
        ProgressUpdate {
            bytes: self.bytes,
            total: self.total,
            percent,
            speed_mbps,
            eta,
        }
    }
}
