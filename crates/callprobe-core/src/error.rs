//! Error types for callprobe.
//!
//! Three layers of failure exist:
//!
//! - [`SessionFault`]: what the dialog session itself reports (disconnect,
//!   missing document, semantic error).
//! - [`Error`]: the narrow kind raised by a harness primitive or operation.
//! - [`CallFailure`]: the uniform failure every call operation returns,
//!   carrying an [`Error`] as its cause.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::call::CallState;

/// Failure reported by the dialog session collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFault {
    /// The remote side hung up or the connection closed
    #[error("connection disconnected (hangup)")]
    Disconnected,

    /// The local driver hung the call up
    #[error("call hung up by the driver")]
    HungUp,

    /// The producer was interrupted while delivering output
    #[error("interrupted while delivering session output")]
    ProducerInterrupted,

    /// The dialog document could not be found
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The session could not be established or is no longer reachable
    #[error("connection error: {0}")]
    Connection(String),

    /// The dialog raised an error while executing
    #[error("semantic error: {0}")]
    Semantic(String),

    /// Any other session failure
    #[error("{0}")]
    Other(String),
}

/// Main error type for callprobe operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No signal arrived within the deadline
    #[error("Timeout waiting for session after {}ms", .0.as_millis())]
    WaitTimeout(Duration),

    /// A blocked wait was cancelled
    #[error("Wait interrupted")]
    Interrupted,

    /// The session reported a failure
    #[error("Session error: {0}")]
    Session(SessionFault),

    /// The session said something other than what the test expected
    #[error("Expected to hear '{expected}' but heard '{actual}'")]
    UnexpectedUtterance {
        /// Expected text (or pattern)
        expected: String,
        /// Spoken text actually received
        actual: String,
    },

    /// The call could not be established
    #[error("Call failed: {0}")]
    CallFailed(SessionFault),

    /// Operation not valid in the current call state
    #[error("Cannot {operation} while call is {state}")]
    InvalidState {
        /// The attempted operation
        operation: &'static str,
        /// State the call was in
        state: CallState,
    },

    /// Character is not a DTMF key
    #[error("Invalid DTMF digit: {0:?}")]
    InvalidDigit(char),

    /// Regular expression could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(err))
    }
}

impl From<SessionFault> for Error {
    fn from(fault: SessionFault) -> Self {
        Error::Session(fault)
    }
}

impl Error {
    /// The session fault behind this error, if any.
    pub fn session_fault(&self) -> Option<&SessionFault> {
        match self {
            Error::Session(fault) | Error::CallFailed(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Uniform failure raised by every call operation.
///
/// Whatever went wrong, a driver receives one of these; the underlying
/// [`Error`] is available through [`CallFailure::cause`] and as the
/// [`std::error::Error::source`].
#[derive(Debug, Clone, Error)]
#[error("call assertion failed: {cause}")]
pub struct CallFailure {
    #[source]
    cause: Error,
}

impl CallFailure {
    /// Wrap a cause.
    pub fn new(cause: Error) -> Self {
        Self { cause }
    }

    /// The underlying cause.
    pub fn cause(&self) -> &Error {
        &self.cause
    }

    /// Consume the failure, returning its cause.
    pub fn into_cause(self) -> Error {
        self.cause
    }

    /// Whether the failure was a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, Error::WaitTimeout(_))
    }

    /// Whether the failure was an interrupted wait.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.cause, Error::Interrupted)
    }

    /// The session fault behind the failure, if any.
    pub fn session_fault(&self) -> Option<&SessionFault> {
        self.cause.session_fault()
    }
}

impl From<Error> for CallFailure {
    fn from(cause: Error) -> Self {
        Self::new(cause)
    }
}

/// Result type for call operations.
pub type CallResult<T> = std::result::Result<T, CallFailure>;
