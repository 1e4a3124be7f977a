//! Events emitted by a dialog session.

use crate::{ConnectionInfo, SessionFault, Utterance};

/// A discrete event produced on the session's own thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionSignal {
    /// The session started running
    Started,
    /// The session connected to the given endpoint
    Connected(ConnectionInfo),
    /// The session produced output
    OutputReady(Utterance),
    /// The session is listening for input
    ExpectingInput,
    /// The session stopped listening for input
    InputClosed,
    /// The session ended the connection
    Disconnected,
    /// The session failed
    Error(SessionFault),
}

impl SessionSignal {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SessionSignal::Started => "started",
            SessionSignal::Connected(_) => "connected",
            SessionSignal::OutputReady(_) => "output_ready",
            SessionSignal::ExpectingInput => "expecting_input",
            SessionSignal::InputClosed => "input_closed",
            SessionSignal::Disconnected => "disconnected",
            SessionSignal::Error(_) => "error",
        }
    }

    /// Whether the signal ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionSignal::Disconnected | SessionSignal::Error(_))
    }
}

/// Callback surface a session invokes on its own thread(s).
///
/// Implementations must be cheap and must not assume which thread calls
/// them. `output_ready` may block until the previous output was consumed.
pub trait SessionEvents: Send + Sync {
    /// The session started.
    fn started(&self);

    /// The session connected to `remote`.
    fn connected(&self, remote: &ConnectionInfo);

    /// The session produced output.
    fn output_ready(&self, utterance: Utterance);

    /// The session is ready to accept input.
    fn expecting_input(&self);

    /// The session stopped accepting input.
    fn input_closed(&self);

    /// The session disconnected.
    fn disconnected(&self);

    /// The session failed with `fault`.
    fn session_error(&self, fault: SessionFault);

    /// Route a [`SessionSignal`] to the matching callback.
    fn dispatch(&self, signal: SessionSignal) {
        match signal {
            SessionSignal::Started => self.started(),
            SessionSignal::Connected(remote) => self.connected(&remote),
            SessionSignal::OutputReady(utterance) => self.output_ready(utterance),
            SessionSignal::ExpectingInput => self.expecting_input(),
            SessionSignal::InputClosed => self.input_closed(),
            SessionSignal::Disconnected => self.disconnected(),
            SessionSignal::Error(fault) => self.session_error(fault),
        }
    }
}
