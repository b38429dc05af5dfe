//! Start-up barrier between the Master and Inject threads (spec §5:
//! "Master and Inject each wait on the other's readiness flag before
//! processing any overlay traffic, so neither begins forwarding client
//! updates before the replication core has installed the initial
//! configuration").
//!
//! Two flags, not a `std::sync::Barrier`: Master becomes ready once its
//! `ReplicaState` has been constructed, Inject once both overlay sockets
//! have bound. Each thread only waits on the *other's* flag, so either can
//! finish setup first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The pair of readiness flags shared between Master and Inject.
#[derive(Debug, Clone, Default)]
pub struct StartupBarrier {
    master_ready: Arc<AtomicBool>,
    inject_ready: Arc<AtomicBool>,
}

/// How long `wait_for_*` sleeps between polls. Start-up is a one-time
/// cost, so a short fixed sleep is preferable to a condvar for this
/// crate's "no async runtime, explicit control flow" style.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

impl StartupBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_master_ready(&self) {
        self.master_ready.store(true, Ordering::SeqCst);
    }

    pub fn mark_inject_ready(&self) {
        self.inject_ready.store(true, Ordering::SeqCst);
    }

    pub fn master_is_ready(&self) -> bool {
        self.master_ready.load(Ordering::SeqCst)
    }

    pub fn inject_is_ready(&self) -> bool {
        self.inject_ready.load(Ordering::SeqCst)
    }

    /// Blocks the calling thread until Master has signaled readiness, or
    /// `shutdown` is observed. Intended for the Inject thread's start-up.
    pub fn wait_for_master(&self, shutdown: &crate::shutdown::ShutdownToken) {
        while !self.master_is_ready() && !shutdown.is_cancelled() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocks the calling thread until Inject has signaled readiness, or
    /// `shutdown` is observed. Intended for the Master thread's start-up.
    pub fn wait_for_inject(&self, shutdown: &crate::shutdown::ShutdownToken) {
        while !self.inject_is_ready() && !shutdown.is_cancelled() {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownToken;

    #[test]
    fn wait_returns_immediately_once_flag_is_set() {
        let barrier = StartupBarrier::new();
        let shutdown = ShutdownToken::new();
        barrier.mark_master_ready();
        barrier.wait_for_master(&shutdown);
    }

    #[test]
    fn wait_unblocks_on_shutdown_without_readiness() {
        let barrier = StartupBarrier::new();
        let shutdown = ShutdownToken::new();
        shutdown.cancel();
        barrier.wait_for_inject(&shutdown);
        assert!(!barrier.inject_is_ready());
    }

    #[test]
    fn flags_are_independent() {
        let barrier = StartupBarrier::new();
        barrier.mark_inject_ready();
        assert!(barrier.inject_is_ready());
        assert!(!barrier.master_is_ready());
    }
}
