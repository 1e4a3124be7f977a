//! # callprobe-script
//!
//! Scripted dialog sessions for callprobe.
//!
//! This crate provides:
//! - [`DialogScript`], a YAML form-based dialog description
//! - [`DialogLibrary`], scripts addressed by URI
//! - [`ScriptedConnector`], a [`callprobe_core::SessionConnector`] whose
//!   sessions interpret scripts on their own thread
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends only on callprobe-core and
//! stands in for a real voice platform behind the session traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod library;
pub mod script;
pub mod session;

// Re-export commonly used types
pub use library::DialogLibrary;
pub use script::{Collected, DialogScript, DtmfCollector, Form, InputMode, InputSpec, Prompt};
pub use session::{ScriptedConnector, ScriptedSession};
