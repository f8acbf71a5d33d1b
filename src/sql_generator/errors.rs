use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlGenError {
    #[error("Plan has no primary table")]
    NoPrimaryTable,
    #[error("Null operand for `{kind}` on {column} (expected an IS NULL / IS NOT NULL check)")]
    NullOperand { kind: String, column: String },
}
