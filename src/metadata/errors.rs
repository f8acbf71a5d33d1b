//! # Metadata Error Types
//!
//! Errors raised while loading an entity schema or resolving an entity/field
//! name against it during plan construction.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetadataError {
    #[error("No entity metadata found for `{type_name}`")]
    UnknownEntity { type_name: String },
    #[error("Entity `{entity}` has no field `{field}`")]
    UnknownField { entity: String, field: String },
    #[error("Entity `{entity}` field `{field}` references unknown type `{other_type}`")]
    DanglingReference {
        entity: String,
        field: String,
        other_type: String,
    },
    #[error("Entity `{0}` is defined more than once")]
    DuplicateEntity(String),
    #[error("Failed to read schema file: {error}")]
    SchemaReadError { error: String },
    #[error("Failed to parse schema: {error}")]
    SchemaParseError { error: String },
}

impl MetadataError {
    pub fn unknown_field(entity: &str, field: &str) -> Self {
        MetadataError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }
}
