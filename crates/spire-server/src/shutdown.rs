//! Structured shutdown (spec §9 Design Note: "signal-handler based cleanup
//! replaced by a cancellation token observed by every blocking wait").
//!
//! The binary crate installs a signal handler that calls
//! [`ShutdownToken::cancel`]; Master and Inject check
//! [`ShutdownToken::is_cancelled`] on every iteration of their
//! readiness-wait loop and exit cleanly instead of being torn down from
//! inside a signal handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
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
