//! Order-by resolution and default ordering.

use crate::filter::{OrderByLiteral, OrderByValue, SortDirection};
use crate::metadata::{EntityMetadata, FieldKind, MetadataProvider};

use super::alias_assigner::AliasAssigner;
use super::errors::PlanError;
use super::plan_builder::base_joins;
use super::{ColumnRef, JoinTable, JoinType, ParsedOrderBy, QueryPlan, Table};

/// Append the requested order-bys, then `id ASC` for every table they
/// touched and finally for the primary table, skipping pairs already present.
pub(super) fn add_order_bys<M: MetadataProvider + ?Sized>(
    plan: &mut QueryPlan,
    metadata: &M,
    meta: &EntityMetadata,
    alias: &str,
    order_by: &OrderByLiteral,
    assigner: &mut AliasAssigner,
) -> Result<(), PlanError> {
    let mut touched = vec![];
    resolve(plan, metadata, meta, alias, order_by, assigner, &mut touched)?;
    touched.push(alias.to_string());
    for touched_alias in touched {
        let present = plan
            .order_bys
            .iter()
            .any(|o| o.alias == touched_alias && o.column == "id");
        if !present {
            plan.order_bys.push(ParsedOrderBy {
                alias: touched_alias,
                column: "id".to_string(),
                order: SortDirection::Asc,
            });
        }
    }
    Ok(())
}

fn resolve<M: MetadataProvider + ?Sized>(
    plan: &mut QueryPlan,
    metadata: &M,
    meta: &EntityMetadata,
    alias: &str,
    order_by: &OrderByLiteral,
    assigner: &mut AliasAssigner,
    touched: &mut Vec<String>,
) -> Result<(), PlanError> {
    for (name, value) in &order_by.0 {
        let field = metadata.resolve_field(meta, name)?;
        let column_alias = field.column_alias(alias);
        match (value, &field.kind) {
            (OrderByValue::Direction(order), FieldKind::PrimaryKey) => {
                plan.order_bys.push(ParsedOrderBy {
                    alias: alias.to_string(),
                    column: "id".to_string(),
                    order: *order,
                })
            }
            (
                OrderByValue::Direction(order),
                FieldKind::Primitive { column, .. }
                | FieldKind::Enum { column, .. }
                | FieldKind::ManyToOne { column, .. },
            ) => plan.order_bys.push(ParsedOrderBy {
                alias: column_alias,
                column: column.clone(),
                order: *order,
            }),
            (OrderByValue::Nested(nested), FieldKind::ManyToOne {
                column, other_type, ..
            }) => {
                let other = metadata.entity(other_type)?;
                let existing = plan
                    .joins()
                    .find(|j| {
                        j.col1.alias == column_alias
                            && j.col1.column == *column
                            && j.col2.column == "id"
                            && j.table == other.table_name
                    })
                    .map(|j| j.alias.clone());
                let other_alias = match existing {
                    Some(a) => a,
                    None => {
                        let a = assigner.next_alias(&other.table_name);
                        log::trace!("joining {} as {} for ordering", other.table_name, a);
                        plan.tables.push(Table::Join(JoinTable {
                            alias: a.clone(),
                            table: other.table_name.clone(),
                            join_type: JoinType::Outer,
                            col1: ColumnRef::new(&column_alias, column),
                            col2: ColumnRef::new(&a, "id"),
                            distinct: None,
                        }));
                        for base in base_joins(metadata, other, &a, JoinType::Outer)? {
                            plan.tables.push(Table::Join(base));
                        }
                        a
                    }
                };
                resolve(plan, metadata, other, &other_alias, nested, assigner, touched)?;
                if !touched.contains(&other_alias) {
                    touched.push(other_alias);
                }
            }
            _ => {
                return Err(PlanError::UnsupportedOrderBy {
                    entity: meta.type_name.clone(),
                    field: name.clone(),
                })
            }
        }
    }
    Ok(())
}
