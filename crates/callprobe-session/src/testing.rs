//! Hand-driven dialog session for exercising a [`Call`](crate::Call).
//!
//! [`ManualConnector`] records everything the call sends and lets a test
//! raise session events itself, from any thread, through
//! [`ManualConnector::events`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use callprobe_core::{
    ConnectionInfo, Digit, DialogSession, SessionConnector, SessionEvents, SessionFault, Utterance,
};

/// Input a call delivered to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentInput {
    /// Spoken input
    Utterance(String),
    /// A DTMF key
    Digit(Digit),
}

type DigitHook = Arc<dyn Fn(&dyn SessionEvents) + Send + Sync>;

#[derive(Default)]
struct Shared {
    events: Option<Arc<dyn SessionEvents>>,
    called_uri: Option<String>,
    sent: Vec<SentInput>,
    last_error: Option<SessionFault>,
    call_fault: Option<SessionFault>,
    input_fault: Option<SessionFault>,
    on_digit: Option<DigitHook>,
    terminated: bool,
}

/// Connector whose sessions do nothing on their own.
#[derive(Clone, Default)]
pub struct ManualConnector {
    shared: Arc<Mutex<Shared>>,
}

impl ManualConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self::default()
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Event sink of the most recently opened session.
    ///
    /// Events raised before a session was opened are dropped.
    pub fn events(&self) -> Arc<dyn SessionEvents> {
        Arc::new(Relay {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Make `place_call` fail with `fault`.
    pub fn fail_calls_with(&self, fault: SessionFault) {
        self.shared().call_fault = Some(fault);
    }

    /// Make spoken input and digits fail with `fault`.
    pub fn fail_input_with(&self, fault: SessionFault) {
        self.shared().input_fault = Some(fault);
    }

    /// Set the error the session reports as its last.
    pub fn set_last_error(&self, fault: SessionFault) {
        self.shared().last_error = Some(fault);
    }

    /// Run `hook` synchronously whenever a digit is injected.
    pub fn on_digit<F>(&self, hook: F)
    where
        F: Fn(&dyn SessionEvents) + Send + Sync + 'static,
    {
        self.shared().on_digit = Some(Arc::new(hook));
    }

    /// URI passed to the last `place_call`.
    pub fn called_uri(&self) -> Option<String> {
        self.shared().called_uri.clone()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentInput> {
        self.shared().sent.clone()
    }

    /// Whether a session was terminated.
    pub fn was_terminated(&self) -> bool {
        self.shared().terminated
    }
}

impl SessionConnector for ManualConnector {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::default()
    }

    fn open(&self, events: Arc<dyn SessionEvents>) -> Result<Box<dyn DialogSession>, SessionFault> {
        let mut shared = self.shared();
        shared.events = Some(events);
        shared.terminated = false;
        Ok(Box::new(ManualSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ManualSession {
    shared: Arc<Mutex<Shared>>,
}

impl ManualSession {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, input: SentInput) -> Result<(), SessionFault> {
        let mut shared = self.shared();
        if let Some(fault) = &shared.input_fault {
            return Err(fault.clone());
        }
        shared.sent.push(input);
        Ok(())
    }
}

impl DialogSession for ManualSession {
    fn place_call(&mut self, uri: &str) -> Result<(), SessionFault> {
        let mut shared = self.shared();
        shared.called_uri = Some(uri.to_string());
        match &shared.call_fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn transmit_utterance(&mut self, text: &str) -> Result<(), SessionFault> {
        self.record(SentInput::Utterance(text.to_string()))
    }

    fn inject_digit(&mut self, digit: Digit) -> Result<(), SessionFault> {
        self.record(SentInput::Digit(digit))?;
        let (hook, events) = {
            let shared = self.shared();
            (shared.on_digit.clone(), shared.events.clone())
        };
        if let (Some(hook), Some(events)) = (hook, events) {
            hook(events.as_ref());
        }
        Ok(())
    }

    fn terminate(&mut self) {
        self.shared().terminated = true;
    }

    fn last_error(&self) -> Option<SessionFault> {
        self.shared().last_error.clone()
    }
}

/// Forwards to the current session's sink without holding the lock.
struct Relay {
    shared: Arc<Mutex<Shared>>,
}

impl Relay {
    fn with(&self, f: impl FnOnce(&dyn SessionEvents)) {
        let events = self
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .clone();
        if let Some(events) = events {
            f(events.as_ref());
        }
    }
}

impl SessionEvents for Relay {
    fn started(&self) {
        self.with(|events| events.started());
    }

    fn connected(&self, remote: &ConnectionInfo) {
        self.with(|events| events.connected(remote));
    }

    fn output_ready(&self, utterance: Utterance) {
        self.with(|events| events.output_ready(utterance));
    }

    fn expecting_input(&self) {
        self.with(|events| events.expecting_input());
    }

    fn input_closed(&self) {
        self.with(|events| events.input_closed());
    }

    fn disconnected(&self) {
        self.with(|events| events.disconnected());
    }

    fn session_error(&self, fault: SessionFault) {
        self.with(|events| events.session_error(fault));
    }
}
