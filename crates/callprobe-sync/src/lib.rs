//! # callprobe-sync
//!
//! Blocking primitives that turn a session's asynchronous event stream into
//! call-and-response steps for a test driver.
//!
//! This crate provides:
//! - [`HandoffBuffer`]: single-slot producer/consumer mailbox for output
//! - [`ReadinessMonitor`]: level-triggered "expecting input" latch
//!
//! Both accept a terminal fault that releases every blocked waiter, and an
//! [`InterruptFlag`] that cancels the current or next wait.
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on callprobe-core only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handoff;
pub mod interrupt;
pub mod readiness;
pub mod wait;

// Re-export commonly used types
pub use handoff::HandoffBuffer;
pub use interrupt::InterruptFlag;
pub use readiness::ReadinessMonitor;
pub use wait::wait_limit;
