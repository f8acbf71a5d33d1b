//! ormplan - query compilation core for an ORM
//!
//! This crate turns nested entity filters into relational query plans:
//! - Filter literals decided once at the JSON boundary
//! - Plan building against entity metadata (joins, inheritance, soft deletes)
//! - Collection-join rewrites into `EXISTS` or `LATERAL` subqueries
//! - Join pruning and PostgreSQL rendering

pub mod config;
pub mod filter;
pub mod join_pruner;
pub mod metadata;
pub mod query_plan;
pub mod rewrite;
pub mod sql_generator;

use thiserror::Error;

use config::PlanConfig;
use filter::{EntityFilter, FilterError};
use metadata::MetadataProvider;
use query_plan::{parse_find_query, FindOptions, PlanError};
use sql_generator::{RenderedQuery, SqlGenError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error("Rendering failed: {0}")]
    Sql(#[from] SqlGenError),
}

/// Build, rewrite and render the find query for `type_name` in one call.
pub fn compile_find_query<M: MetadataProvider + ?Sized>(
    metadata: &M,
    config: &PlanConfig,
    type_name: &str,
    filter: &EntityFilter,
    options: &FindOptions,
) -> Result<RenderedQuery, CompileError> {
    let plan = parse_find_query(metadata, config, type_name, filter, options)?;
    Ok(sql_generator::to_sql(&plan)?)
}
