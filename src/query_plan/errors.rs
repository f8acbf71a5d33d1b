use thiserror::Error;

use crate::metadata::MetadataError;

/// Failures while building or rewriting a plan. All are fatal to the current
/// compile call; a plan from a failed call must not be used.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("{0}")]
    Metadata(MetadataError),

    #[error("Unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Cannot join through polymorphic field {entity}.{field}")]
    JoinThroughPolymorphic { entity: String, field: String },

    #[error("Unsupported filter on {entity}.{field}: {shape}")]
    UnsupportedFilterShape {
        entity: String,
        field: String,
        shape: String,
    },

    #[error("Raw condition `{condition}` spans collection roots {roots:?}")]
    RawSpansRoots {
        condition: String,
        roots: Vec<String>,
    },

    #[error("Value filter `{kind}` is not supported on {column}")]
    UnhandledValueFilter { kind: String, column: String },

    #[error("Visitor cannot replace or delete a root `{0}` node")]
    VisitorRootReplacement(String),

    #[error("Unknown alias binding '{0}'")]
    UnknownAliasBinding(String),

    #[error("Invalid id `{value}`: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("Cannot order {entity} by '{field}'")]
    UnsupportedOrderBy { entity: String, field: String },
}

impl From<MetadataError> for PlanError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::UnknownField { entity, field } => {
                PlanError::UnknownField { entity, field }
            }
            other => PlanError::Metadata(other),
        }
    }
}
