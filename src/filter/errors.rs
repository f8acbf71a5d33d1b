use thiserror::Error;

/// Errors converting an external (JSON) filter literal into the typed model.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FilterError {
    #[error("Expected a JSON object for {context}, got {actual}")]
    ExpectedObject { context: String, actual: String },

    #[error("Unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("Operator `{op}` expects {expected}")]
    InvalidOperand { op: String, expected: String },

    #[error("Invalid order direction `{0}`, expected ASC or DESC")]
    InvalidDirection(String),

    #[error("Invalid condition literal: {0}")]
    InvalidCondition(String),
}
