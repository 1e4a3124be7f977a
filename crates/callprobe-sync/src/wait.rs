//! Deadline handling shared by the blocking primitives.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Interpret a caller-supplied timeout: zero means wait indefinitely.
pub fn wait_limit(timeout: Duration) -> Option<Duration> {
    if timeout.is_zero() {
        None
    } else {
        Some(timeout)
    }
}

/// Outcome of one bounded wait on a condition variable.
pub(crate) enum Wake<'a, T> {
    /// Woken (or spuriously woken); re-check the state
    Woken(MutexGuard<'a, T>),
    /// The deadline passed
    Expired(MutexGuard<'a, T>),
}

/// A point in time a wait must not outlive, or none.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `limit` from now. A limit too far out to represent never
    /// expires.
    pub(crate) fn after(limit: Option<Duration>) -> Self {
        Self {
            at: limit.and_then(|limit| Instant::now().checked_add(limit)),
        }
    }

    /// Block on `condvar` until notified or the deadline passes.
    pub(crate) fn wait<'a, T>(&self, condvar: &Condvar, guard: MutexGuard<'a, T>) -> Wake<'a, T> {
        match self.at {
            None => Wake::Woken(
                condvar
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            ),
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    return Wake::Expired(guard);
                }
                let (guard, _) = condvar
                    .wait_timeout(guard, at - now)
                    .unwrap_or_else(PoisonError::into_inner);
                Wake::Woken(guard)
            }
        }
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
