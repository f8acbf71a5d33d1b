//! Render a [`QueryPlan`] as parameterised PostgreSQL.
//!
//! Values are never inlined: every operand becomes a `?` placeholder and is
//! appended to [`RenderedQuery::bindings`] in textual order.

mod errors;
mod to_sql;

pub use errors::SqlGenError;

use crate::filter::Value;
use crate::query_plan::QueryPlan;

use to_sql::ToSql;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
}

pub fn to_sql(plan: &QueryPlan) -> Result<RenderedQuery, SqlGenError> {
    let mut bindings = vec![];
    let sql = plan.to_sql(&mut bindings)?;
    Ok(RenderedQuery { sql, bindings })
}
