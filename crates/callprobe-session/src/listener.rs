//! Adapter between session callbacks and the call's blocking primitives.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use callprobe_core::{CallId, ConnectionInfo, Error, SessionEvents, SessionFault, Utterance};
use callprobe_sync::{HandoffBuffer, ReadinessMonitor};

/// Feeds session events into a call's handoff buffer and readiness monitor.
///
/// - `output_ready` deposits into the handoff buffer (blocking while the
///   previous utterance is unclaimed)
/// - `expecting_input` raises readiness
/// - `disconnected` and `session_error` terminate both primitives
///
/// Every event is also forwarded to registered taps.
pub struct CallListener {
    call_id: CallId,
    output: Arc<HandoffBuffer<Utterance>>,
    readiness: Arc<ReadinessMonitor>,
    taps: RwLock<Vec<Arc<dyn SessionEvents>>>,
}

impl CallListener {
    /// Create a listener feeding the given primitives.
    pub fn new(
        call_id: CallId,
        output: Arc<HandoffBuffer<Utterance>>,
        readiness: Arc<ReadinessMonitor>,
    ) -> Self {
        Self {
            call_id,
            output,
            readiness,
            taps: RwLock::new(Vec::new()),
        }
    }

    /// Forward every event to `tap` as well.
    pub fn add_tap(&self, tap: Arc<dyn SessionEvents>) {
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tap);
    }

    fn each_tap(&self, f: impl Fn(&dyn SessionEvents)) {
        let taps = self.taps.read().unwrap_or_else(PoisonError::into_inner);
        for tap in taps.iter() {
            f(tap.as_ref());
        }
    }

    fn terminate(&self, fault: SessionFault) {
        self.output.signal_terminal(fault.clone());
        self.readiness.signal_terminal(fault);
    }
}

impl SessionEvents for CallListener {
    fn started(&self) {
        debug!("Session started: call={}", self.call_id);
        self.each_tap(|tap| tap.started());
    }

    fn connected(&self, remote: &ConnectionInfo) {
        info!("Session connected: call={}, remote={}", self.call_id, remote);
        self.each_tap(|tap| tap.connected(remote));
    }

    fn output_ready(&self, utterance: Utterance) {
        debug!("Session output: call={}, '{}'", self.call_id, utterance);
        self.each_tap(|tap| tap.output_ready(utterance.clone()));
        match self.output.deposit(utterance) {
            Ok(()) => {}
            Err(Error::Session(fault)) => {
                debug!(
                    "Dropping output after session ended: call={}, {}",
                    self.call_id, fault
                );
            }
            Err(e) => warn!("Failed to hand off output: call={}, {}", self.call_id, e),
        }
    }

    fn expecting_input(&self) {
        debug!("Session expecting input: call={}", self.call_id);
        self.readiness.signal_ready();
        self.each_tap(|tap| tap.expecting_input());
    }

    fn input_closed(&self) {
        debug!("Session input closed: call={}", self.call_id);
        self.each_tap(|tap| tap.input_closed());
    }

    fn disconnected(&self) {
        info!("Session disconnected: call={}", self.call_id);
        self.terminate(SessionFault::Disconnected);
        self.each_tap(|tap| tap.disconnected());
    }

    fn session_error(&self, fault: SessionFault) {
        warn!("Session error: call={}, {}", self.call_id, fault);
        self.terminate(fault.clone());
        self.each_tap(|tap| tap.session_error(fault.clone()));
    }
}
