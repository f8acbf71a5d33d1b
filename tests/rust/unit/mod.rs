//! Unit tests - public API behaviour without a database
//!
//! JSON filter literals are compiled to SQL against the fixture schema.

mod json_filter_tests;
mod schema_loading_tests;

use ormplan::metadata::Schema;

const LIBRARY_SCHEMA: &str = include_str!("../../fixtures/library_schema.yaml");

fn library_schema() -> Schema {
    Schema::from_yaml_str(LIBRARY_SCHEMA).expect("fixture schema loads")
}
