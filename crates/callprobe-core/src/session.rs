//! The dialog session collaborator seen from the harness.
//!
//! A [`SessionConnector`] creates sessions; each [`DialogSession`] reports
//! back through the [`SessionEvents`] it was opened with.

use std::sync::Arc;

use crate::{ConnectionInfo, Digit, SessionEvents, SessionFault};

/// Handle to one running dialog session.
pub trait DialogSession: Send {
    /// Start the dialog located at `uri`.
    fn place_call(&mut self, uri: &str) -> Result<(), SessionFault>;

    /// Send spoken input to the session.
    fn transmit_utterance(&mut self, text: &str) -> Result<(), SessionFault>;

    /// Send a single DTMF key to the session.
    fn inject_digit(&mut self, digit: Digit) -> Result<(), SessionFault>;

    /// Stop the dialog. Must not block on the event consumer.
    fn terminate(&mut self);

    /// The most recent failure the session recorded, if any.
    fn last_error(&self) -> Option<SessionFault>;

    /// Release resources held for this session (threads, sockets).
    ///
    /// Called once after [`DialogSession::terminate`].
    fn release(&mut self) {}
}

/// Factory for dialog sessions.
pub trait SessionConnector: Send + Sync {
    /// Address the session's events are carried over.
    fn connection_info(&self) -> ConnectionInfo;

    /// Create a session that reports to `events`.
    fn open(&self, events: Arc<dyn SessionEvents>) -> Result<Box<dyn DialogSession>, SessionFault>;
}
