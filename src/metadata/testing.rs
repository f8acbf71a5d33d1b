//! Shared fixture schema for unit tests.

use super::Schema;

pub const LIBRARY_SCHEMA_YAML: &str = include_str!("../../tests/fixtures/library_schema.yaml");

pub fn library_schema() -> Schema {
    Schema::from_yaml_str(LIBRARY_SCHEMA_YAML).expect("fixture schema must load")
}
