//! # callprobe-core
//!
//! Core types for callprobe.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other callprobe crates. It provides:
//!
//! - Utterances and the session signals that carry them
//! - DTMF digits
//! - Call identity, state and connection addressing
//! - The dialog session collaborator traits
//! - Error types and configuration
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other callprobe crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod config;
pub mod digit;
pub mod error;
pub mod session;
pub mod signal;
pub mod utterance;

// Re-export commonly used types
pub use call::{CallId, CallState, ConnectionInfo};
pub use config::{CallSettings, HarnessConfig, LoggingSettings, RecordingSettings, ServerSettings};
pub use digit::Digit;
pub use error::{CallFailure, CallResult, Error, Result, SessionFault};
pub use session::{DialogSession, SessionConnector};
pub use signal::{SessionEvents, SessionSignal};
pub use utterance::{Segment, Utterance};
