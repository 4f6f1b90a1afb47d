// src/core/cancellation.rs

use crate::CancellationToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Returned by a checkpoint when cancellation has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Cooperative interruption point for the pipe pump.
///
/// The gate never preempts anything: the token may be set at any time (from a
/// signal handler or another thread), but it is only observed at
/// [`checkpoint`](Self::checkpoint) calls placed around the pump's blocking wait.
/// The wait itself is bounded by [`wait_slice`](Self::wait_slice) so a flag set
/// without an accompanying signal is still noticed promptly.
#[derive(Debug, Clone)]
pub struct CancellationGate {
    token: CancellationToken,
    wait_slice: Duration,
}

impl CancellationGate {
    pub fn new(token: CancellationToken, wait_slice: Duration) -> Self {
        Self {
            token,
            wait_slice: wait_slice.max(Duration::from_millis(1)),
        }
    }

    /// A gate whose token nobody else holds; it can only be cancelled through `cancel`.
    pub fn detached(wait_slice: Duration) -> Self {
        Self::new(Arc::new(AtomicBool::new(false)), wait_slice)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.token.store(true, Ordering::SeqCst);
    }

    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            log::debug!("Cancellation observed at checkpoint");
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Longest a single multiplexer wait may block before re-checking the token.
    pub fn wait_slice(&self) -> Duration {
        self.wait_slice
    }
}
