//! End-to-end plan building against the library fixture schema, checked
//! through the rendered SQL.

mod plan_builder_tests;

use crate::config::PlanConfig;
use crate::filter::{EntityFilter, FilterValue, Value, ValueFilter};
use crate::metadata::testing::library_schema;
use crate::sql_generator::{to_sql, RenderedQuery};

use super::{parse_find_query, FindOptions, PlanError, QueryPlan};

fn plan(
    type_name: &str,
    filter: &EntityFilter,
    options: &FindOptions,
) -> Result<QueryPlan, PlanError> {
    parse_find_query(
        &library_schema(),
        &PlanConfig::default(),
        type_name,
        filter,
        options,
    )
}

fn render(type_name: &str, filter: &EntityFilter, options: &FindOptions) -> RenderedQuery {
    let plan = plan(type_name, filter, options).unwrap();
    to_sql(&plan).unwrap()
}

fn sql(type_name: &str, filter: &EntityFilter) -> String {
    render(type_name, filter, &FindOptions::default()).sql
}

fn scalar(value: impl Into<Value>) -> FilterValue {
    FilterValue::Scalar(value.into())
}

fn ops(filters: Vec<ValueFilter>) -> FilterValue {
    FilterValue::Ops(filters)
}

fn sub(filter: EntityFilter) -> FilterValue {
    FilterValue::SubFilter(filter)
}
