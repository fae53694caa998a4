//! Cooperative cancellation and pause signalling.
//!
//! Both are cheap cloneable handles around shared atomics. They are passed
//! explicitly into every transfer so that concurrent runs never share pause
//! or cancel state through a global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token shared between a run and its transfers.
///
/// Checked at well-defined points only: before each entry, per received
/// chunk, and before each archive extraction. There is no forced kill of
/// in-flight I/O beyond closing the transport.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Pause flag polled by the download loop between chunks.
///
/// Toggling it does not change the run's state machine; it only suspends
/// byte movement until un-paused. Not durable across restarts.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag {
    paused: Arc<AtomicBool>,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Flip the flag, returning the new state.
    pub fn toggle(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cancels_all_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn pause_toggle_round_trips() {
        let pause = PauseFlag::new();
        assert!(!pause.is_paused());
        assert!(pause.toggle());
        assert!(pause.is_paused());
        assert!(!pause.toggle());
        assert!(!pause.is_paused());
    }
}
