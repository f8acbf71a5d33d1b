//! Integration tests - compiled plans executed against an in-memory database
//!
//! Every collection-join strategy must select the same primary rows.

mod memory_db;
mod strategy_equivalence_tests;

use ormplan::metadata::Schema;

const LIBRARY_SCHEMA: &str = include_str!("../../fixtures/library_schema.yaml");

fn library_schema() -> Schema {
    Schema::from_yaml_str(LIBRARY_SCHEMA).expect("fixture schema should load")
}
