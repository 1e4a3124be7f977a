//! Blocking monitor for the session's "ready for input" signal.
//!
//! Readiness is level-triggered: a signal raised before anyone waits is kept,
//! repeated signals before the next observation collapse into one, and a
//! successful wait clears the flag so the following wait needs a fresh
//! signal. An interrupt raised while nobody waits cancels the next wait.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tracing::{debug, trace};

use callprobe_core::{Error, Result, SessionFault};

use crate::interrupt::InterruptFlag;
use crate::wait::{lock, wait_limit, Deadline, Wake};

#[derive(Debug, Default)]
struct State {
    ready: bool,
    terminal: Option<SessionFault>,
}

/// Lets a driver block until the session is ready to accept input.
#[derive(Debug, Default)]
pub struct ReadinessMonitor {
    state: Mutex<State>,
    changed: Condvar,
    interrupt: InterruptFlag,
}

impl ReadinessMonitor {
    /// Create a monitor with no pending readiness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor whose waits are cancelled by `interrupt`.
    pub fn with_interrupt(interrupt: InterruptFlag) -> Self {
        Self {
            interrupt,
            ..Self::default()
        }
    }

    /// The session is ready for input. Idempotent until observed.
    pub fn signal_ready(&self) {
        let mut state = lock(&self.state);
        if !state.ready {
            trace!("Session ready for input");
            state.ready = true;
            self.changed.notify_all();
        }
    }

    /// Record a terminal fault; every waiter fails with it from now on.
    pub fn signal_terminal(&self, fault: SessionFault) {
        let mut state = lock(&self.state);
        if state.terminal.is_none() {
            debug!("Readiness terminal signal: {}", fault);
            state.terminal = Some(fault);
        }
        self.changed.notify_all();
    }

    /// Interrupt the blocked wait, or the next wait if none is blocked.
    pub fn interrupt(&self) {
        self.interrupt.raise();
        // Taking the lock orders the notification after the waiter's check
        let _state = lock(&self.state);
        self.changed.notify_all();
    }

    /// Wait indefinitely for readiness.
    pub fn await_ready(&self) -> Result<()> {
        self.await_ready_within(None)
    }

    /// Wait at most `timeout` for readiness (zero waits indefinitely).
    pub fn await_ready_timeout(&self, timeout: Duration) -> Result<()> {
        self.await_ready_within(wait_limit(timeout))
    }

    /// Wait at most `limit` for readiness (`None` waits indefinitely).
    ///
    /// A terminal fault takes precedence over a pending readiness signal:
    /// input sent to a disconnected session would be lost. A pending
    /// interrupt fails the wait first and leaves readiness pending.
    pub fn await_ready_within(&self, limit: Option<Duration>) -> Result<()> {
        let deadline = Deadline::after(limit);
        let mut state = lock(&self.state);
        loop {
            if self.interrupt.take() {
                debug!("Readiness wait interrupted");
                return Err(Error::Interrupted);
            }

            if let Some(fault) = &state.terminal {
                return Err(Error::Session(fault.clone()));
            }

            if state.ready {
                state.ready = false;
                trace!("Readiness observed");
                return Ok(());
            }

            match deadline.wait(&self.changed, state) {
                Wake::Woken(woken) => state = woken,
                Wake::Expired(_) => {
                    debug!("Readiness wait timed out after {:?}", limit);
                    return Err(Error::WaitTimeout(limit.unwrap_or_default()));
                }
            }
        }
    }

    /// Whether an unobserved readiness signal is pending.
    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }
}
