//! Sticky cancellation request for blocking waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A request to abandon the current blocking wait, or the next one if no
/// wait is in progress.
///
/// Raising the flag is remembered until a wait observes it, so a request made
/// while the driver is between waits still cancels its next wait. Clones
/// share the flag, and one raise cancels exactly one wait.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an interruption.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request, returning whether there was one.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }

    /// Whether a request is pending.
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
