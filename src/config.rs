use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::filter::Value;
use crate::metadata::IdType;
use crate::rewrite::JoinStrategy;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Id values that references to unsaved entities compile to, per id type.
/// They must never match a stored row.
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct NilIdSentinels {
    pub int: i64,

    #[validate(custom(function = "validate_uuid"))]
    pub uuid: String,

    pub untagged_string: String,
}

impl Default for NilIdSentinels {
    fn default() -> Self {
        Self {
            int: -1,
            uuid: uuid::Uuid::nil().to_string(),
            untagged_string: String::new(),
        }
    }
}

impl NilIdSentinels {
    pub fn for_type(&self, id_type: IdType) -> Value {
        match id_type {
            IdType::Int => Value::Int(self.int),
            IdType::Uuid => Value::Text(self.uuid.clone()),
            IdType::UntaggedString => Value::Text(self.untagged_string.clone()),
        }
    }
}

fn validate_uuid(value: &str) -> Result<(), ValidationError> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("nil uuid sentinel must be a valid UUID"))
}

/// Plan compilation configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    #[validate(nested)]
    pub nil_ids: NilIdSentinels,

    /// Column used when an entity is soft-deletable without naming its column
    #[validate(length(min = 1, message = "Soft delete column cannot be empty"))]
    pub soft_delete_column: String,

    /// Collection-join rewrite used when a find call does not choose one
    pub default_strategy: JoinStrategy,

    /// Minimum number of sibling collection joins under one parent before the
    /// LATERAL rewrite kicks in (unless forced)
    #[validate(range(
        min = 1,
        max = 16,
        message = "Lateral sibling threshold must be between 1 and 16"
    ))]
    pub lateral_sibling_threshold: usize,

    /// Whether to remove unreferenced joins after rewriting
    pub prune_joins: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            nil_ids: NilIdSentinels::default(),
            soft_delete_column: "deleted_at".to_string(),
            default_strategy: JoinStrategy::Exists,
            lateral_sibling_threshold: 2,
            prune_joins: true,
        }
    }
}

impl PlanConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = NilIdSentinels::default();
        let config = Self {
            nil_ids: NilIdSentinels {
                int: parse_env_var("ORMPLAN_NIL_INT_ID", "-1")?,
                uuid: env::var("ORMPLAN_NIL_UUID_ID").unwrap_or(defaults.uuid),
                untagged_string: env::var("ORMPLAN_NIL_STRING_ID")
                    .unwrap_or(defaults.untagged_string),
            },
            soft_delete_column: env::var("ORMPLAN_SOFT_DELETE_COLUMN")
                .unwrap_or_else(|_| "deleted_at".to_string()),
            default_strategy: parse_env_var("ORMPLAN_DEFAULT_STRATEGY", "exists")?,
            lateral_sibling_threshold: parse_env_var("ORMPLAN_LATERAL_SIBLING_THRESHOLD", "2")?,
            prune_joins: parse_env_var("ORMPLAN_PRUNE_JOINS", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
