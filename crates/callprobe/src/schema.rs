//! JSON Schema for scenario files.
//!
//! Editors and YAML language servers commonly understand draft-07 only, so
//! the schema can be produced in either draft.

use schemars::generate::SchemaSettings;
use serde_json::Value;

use crate::scenario::Scenario;

/// JSON Schema dialect to emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaDraft {
    /// Draft 2020-12 (`$defs`)
    #[default]
    Draft2020_12,
    /// Draft-07 (`definitions`)
    Draft07,
}

/// Generate the schema of [`Scenario`] documents.
pub fn scenario_schema(draft: SchemaDraft) -> Value {
    let settings = match draft {
        SchemaDraft::Draft2020_12 => SchemaSettings::draft2020_12(),
        SchemaDraft::Draft07 => SchemaSettings::draft07(),
    };
    settings
        .into_generator()
        .into_root_schema_for::<Scenario>()
        .to_value()
}
