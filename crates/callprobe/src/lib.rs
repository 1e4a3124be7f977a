//! callprobe Library
//!
//! Scenario files, their execution against scripted dialog sessions and the
//! command-line surface. The binary is in main.rs.

pub mod cli;
pub mod runner;
pub mod scenario;
pub mod schema;

// Re-export commonly used types
pub use cli::{Cli, Command, RunArgs};
pub use runner::{ScenarioReport, ScenarioRunner};
pub use scenario::{Scenario, Step};
pub use schema::{scenario_schema, SchemaDraft};
