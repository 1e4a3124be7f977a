//! Blocking test-call façade over an event-driven dialog session.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use callprobe_core::{
    CallFailure, CallId, CallResult, CallSettings, CallState, Digit, DialogSession, Error,
    SessionConnector, SessionEvents, SessionFault, Utterance,
};
use callprobe_sync::{wait_limit, HandoffBuffer, InterruptFlag, ReadinessMonitor};

use crate::listener::CallListener;
use crate::observer::CallObserver;

/// One end-to-end test call.
///
/// A call drives a dialog session from a single thread: it places the call,
/// waits for each utterance the session speaks, answers with speech or DTMF
/// once the session listens, and finally hangs up. Each blocking operation
/// takes an optional timeout; `None` falls back to
/// [`CallSettings::default_timeout_ms`] and a zero duration waits forever.
///
/// Every failure is returned as a [`CallFailure`] and reported to observers
/// first. When the session recorded an error of its own, that error becomes
/// the cause in place of the local timeout or interrupt.
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use callprobe_core::{CallResult, SessionConnector};
/// # use callprobe_session::Call;
/// # fn run(connector: Arc<dyn SessionConnector>) -> CallResult<()> {
/// let mut call = Call::new(connector);
/// call.place_call("file:dtmf.vxml")?;
/// call.expect_to_hear("Do you like this example? Please enter 1 for yes or 2 for no", None)?;
/// call.enter_digits("1", None)?;
/// call.expect_to_hear("You like this example.", None)?;
/// call.hang_up();
/// # Ok(())
/// # }
/// ```
pub struct Call {
    id: CallId,
    settings: CallSettings,
    connector: Arc<dyn SessionConnector>,
    session: Option<Box<dyn DialogSession>>,
    state: CallState,
    output: Arc<HandoffBuffer<Utterance>>,
    readiness: Arc<ReadinessMonitor>,
    listener: Arc<CallListener>,
    /// Real output caught by the post-digit drain, returned next
    held: Option<Utterance>,
    last_utterance: Option<Utterance>,
    last_error: Option<Error>,
    observers: Vec<Arc<dyn CallObserver>>,
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Call {
    /// Create an idle call with default settings.
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self::with_settings(connector, CallSettings::default())
    }

    /// Create an idle call with the given settings.
    pub fn with_settings(connector: Arc<dyn SessionConnector>, settings: CallSettings) -> Self {
        let id = CallId::new();
        // One request cancels whichever wait the driver is in or enters next
        let interrupt = InterruptFlag::new();
        let output = Arc::new(HandoffBuffer::with_claim_interrupt(interrupt.clone()));
        let readiness = Arc::new(ReadinessMonitor::with_interrupt(interrupt));
        let listener = Arc::new(CallListener::new(
            id,
            Arc::clone(&output),
            Arc::clone(&readiness),
        ));

        Self {
            id,
            settings,
            connector,
            session: None,
            state: CallState::Idle,
            output,
            readiness,
            listener,
            held: None,
            last_utterance: None,
            last_error: None,
            observers: Vec::new(),
        }
    }

    /// Get the call ID.
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> CallState {
        self.state
    }

    /// Get the call settings.
    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// The utterance most recently returned to the driver.
    pub fn last_utterance(&self) -> Option<&Utterance> {
        self.last_utterance.as_ref()
    }

    /// Register an observer for lifecycle notifications.
    pub fn add_observer(&mut self, observer: Arc<dyn CallObserver>) {
        self.observers.push(observer);
    }

    /// Receive the raw session events of this call as well.
    pub fn add_session_listener(&self, events: Arc<dyn SessionEvents>) {
        self.listener.add_tap(events);
    }

    /// A handle another thread can use to cancel the driver's current or
    /// next wait.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            output: Arc::clone(&self.output),
            readiness: Arc::clone(&self.readiness),
        }
    }

    /// Open a session and start the dialog at `uri`.
    pub fn place_call(&mut self, uri: &str) -> CallResult<()> {
        if self.state != CallState::Idle {
            return Err(self.invalid_state("place a call"));
        }

        info!(
            "Placing call: id={}, uri='{}', remote={}",
            self.id,
            uri,
            self.connector.connection_info()
        );
        self.state = CallState::Dialing;
        self.last_error = None;

        let events: Arc<dyn SessionEvents> = self.listener.clone();
        let mut session = match self.connector.open(events) {
            Ok(session) => session,
            Err(fault) => return Err(self.call_failed(fault)),
        };

        if let Err(fault) = session.place_call(uri) {
            self.shut_down(session);
            return Err(self.call_failed(fault));
        }

        self.session = Some(session);
        self.state = CallState::Active;
        for observer in &self.observers {
            observer.call_placed(self.id, uri);
        }
        info!("Call placed: id={}", self.id);
        Ok(())
    }

    /// Wait for the next utterance the session speaks.
    pub fn expect_next_utterance(&mut self, timeout: Option<Duration>) -> CallResult<Utterance> {
        self.ensure_active("wait for output")?;

        let utterance = match self.held.take() {
            Some(utterance) => utterance,
            None => match self.output.claim_within(self.limit(timeout)) {
                Ok(utterance) => utterance,
                Err(e) => return Err(self.fail(e)),
            },
        };

        for observer in &self.observers {
            observer.utterance_heard(self.id, &utterance);
        }
        info!("Heard: id={}, '{}'", self.id, utterance);
        self.last_utterance = Some(utterance.clone());
        Ok(utterance)
    }

    /// Wait for the next utterance and check its spoken text equals `text`.
    pub fn expect_to_hear(&mut self, text: &str, timeout: Option<Duration>) -> CallResult<Utterance> {
        let utterance = self.expect_next_utterance(timeout)?;
        let actual = utterance.text_content();
        if actual != text {
            return Err(self.report(Error::UnexpectedUtterance {
                expected: text.to_string(),
                actual,
            }));
        }
        Ok(utterance)
    }

    /// Wait for the next utterance and check its spoken text matches `pattern`.
    pub fn expect_to_hear_matching(
        &mut self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> CallResult<Utterance> {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => return Err(self.report(Error::InvalidPattern(e.to_string()))),
        };

        let utterance = self.expect_next_utterance(timeout)?;
        let actual = utterance.text_content();
        if !regex.is_match(&actual) {
            return Err(self.report(Error::UnexpectedUtterance {
                expected: pattern.to_string(),
                actual,
            }));
        }
        Ok(utterance)
    }

    /// Wait until the session listens, then speak `text`.
    pub fn say(&mut self, text: &str, timeout: Option<Duration>) -> CallResult<()> {
        self.ensure_active("say")?;
        self.await_ready(timeout)?;

        let sent = self.session_mut("say")?.transmit_utterance(text);
        if let Err(fault) = sent {
            return Err(self.fail(Error::Session(fault)));
        }

        for observer in &self.observers {
            observer.input_sent(self.id, text);
        }
        info!("Said: id={}, '{}'", self.id, text);
        Ok(())
    }

    /// Wait until the session listens, then key in `digits` one by one.
    ///
    /// Afterwards, output arriving within
    /// [`CallSettings::digit_drain_timeout_ms`] is drained: a blank update is
    /// discarded, anything else is kept for the next
    /// [`Call::expect_next_utterance`]. Failures while draining are ignored.
    pub fn enter_digits(&mut self, digits: &str, timeout: Option<Duration>) -> CallResult<()> {
        self.ensure_active("enter digits")?;
        let keys = match Digit::parse_sequence(digits) {
            Ok(keys) => keys,
            Err(e) => return Err(self.report(e)),
        };
        self.await_ready(timeout)?;

        for key in keys {
            let injected = self.session_mut("enter digits")?.inject_digit(key);
            if let Err(fault) = injected {
                return Err(self.fail(Error::Session(fault)));
            }
        }

        for observer in &self.observers {
            observer.digits_entered(self.id, digits);
        }
        info!("Entered: id={}, '{}'", self.id, digits);

        self.drain_after_digits();
        Ok(())
    }

    /// Wait until the session is ready to accept input.
    pub fn wait_until_expecting_input(&mut self, timeout: Option<Duration>) -> CallResult<()> {
        self.ensure_active("wait for input")?;
        self.await_ready(timeout)
    }

    /// Terminate the session and release its resources. Idempotent.
    pub fn hang_up(&mut self) {
        let was_active = self.state == CallState::Active;

        if let Some(session) = self.session.take() {
            if let Some(fault) = session.last_error() {
                self.last_error = Some(Error::Session(fault));
            }
            self.shut_down(session);
        }

        if self.state == CallState::Ended {
            return;
        }
        self.state = CallState::Ended;

        if was_active {
            for observer in &self.observers {
                observer.hung_up(self.id);
            }
            info!("Hung up: id={}", self.id);
        }
    }

    /// The most recent failure, preferring the session's own record.
    pub fn last_error(&self) -> Option<Error> {
        self.session
            .as_ref()
            .and_then(|session| session.last_error())
            .map(Error::Session)
            .or_else(|| self.last_error.clone())
    }

    fn limit(&self, timeout: Option<Duration>) -> Option<Duration> {
        match timeout {
            Some(timeout) => wait_limit(timeout),
            None => self.settings.default_timeout(),
        }
    }

    fn await_ready(&mut self, timeout: Option<Duration>) -> CallResult<()> {
        match self.readiness.await_ready_within(self.limit(timeout)) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn drain_after_digits(&mut self) {
        let Some(limit) = self.settings.digit_drain_timeout() else {
            return;
        };
        if self.held.is_some() {
            return;
        }

        match self.output.claim_within(Some(limit)) {
            Ok(utterance) if utterance.is_blank() => {
                debug!("Discarded spurious output after digits: id={}", self.id);
            }
            Ok(utterance) => {
                debug!(
                    "Holding output received while draining: id={}, '{}'",
                    self.id, utterance
                );
                self.held = Some(utterance);
            }
            Err(e) => debug!("Digit drain ended: id={}, {}", self.id, e),
        }
    }

    fn ensure_active(&mut self, operation: &'static str) -> CallResult<()> {
        if self.state == CallState::Active {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&mut self, operation: &'static str) -> CallFailure {
        self.report(Error::InvalidState {
            operation,
            state: self.state,
        })
    }

    fn session_mut(&mut self, operation: &'static str) -> CallResult<&mut dyn DialogSession> {
        if self.session.is_none() {
            return Err(self.invalid_state(operation));
        }
        let state = self.state;
        match self.session.as_deref_mut() {
            Some(session) => Ok(session),
            None => Err(CallFailure::new(Error::InvalidState { operation, state })),
        }
    }

    /// Reconcile a local failure with the session's record, then report it.
    fn fail(&mut self, local: Error) -> CallFailure {
        let cause = match self.session.as_ref().and_then(|session| session.last_error()) {
            Some(fault) => {
                debug!(
                    "Session error supersedes local failure: id={}, local='{}'",
                    self.id, local
                );
                Error::Session(fault)
            }
            None => local,
        };
        self.report(cause)
    }

    fn call_failed(&mut self, fault: SessionFault) -> CallFailure {
        self.state = CallState::Ended;
        self.report(Error::CallFailed(fault))
    }

    fn report(&mut self, cause: Error) -> CallFailure {
        self.last_error = Some(cause.clone());
        let failure = CallFailure::new(cause);
        warn!("Call failure: id={}, {}", self.id, failure.cause());
        for observer in &self.observers {
            observer.failed(self.id, &failure);
        }
        failure
    }

    fn shut_down(&self, mut session: Box<dyn DialogSession>) {
        session.terminate();
        // Release a session thread blocked on the driver before joining it
        self.output.signal_terminal(SessionFault::HungUp);
        self.readiness.signal_terminal(SessionFault::HungUp);
        session.release();
        debug!("Session released: id={}", self.id);
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if self.session.is_some() {
            self.hang_up();
        }
    }
}

/// Cancels the wait the driver of a call is blocked in.
///
/// An interrupt sent while the driver is between waits is kept and fails the
/// driver's next wait, so a cancelled driver never goes on to block
/// indefinitely.
#[derive(Debug, Clone)]
pub struct Interrupter {
    output: Arc<HandoffBuffer<Utterance>>,
    readiness: Arc<ReadinessMonitor>,
}

impl Interrupter {
    /// Interrupt the driver's current wait, or its next one.
    pub fn interrupt(&self) {
        // Both share one flag; this wakes whichever the driver blocks on
        self.output.interrupt_claim();
        self.readiness.interrupt();
    }
}
