//! # callprobe-session
//!
//! Blocking test calls on top of an event-driven dialog session.
//!
//! This crate provides:
//! - [`Call`], the synchronous façade a test drives turn by turn
//! - [`CallListener`], which turns session callbacks into handoffs
//! - [`CallObserver`] notifications and the [`TranscriptRecorder`]
//! - A hand-driven session for tests in [`testing`]
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on callprobe-core and
//! callprobe-sync and works with any [`callprobe_core::SessionConnector`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod listener;
pub mod observer;
pub mod recording;
pub mod testing;

// Re-export commonly used types
pub use call::{Call, Interrupter};
pub use listener::CallListener;
pub use observer::CallObserver;
pub use recording::{EventKind, TranscriptEvent, TranscriptHeader, TranscriptRecorder};
