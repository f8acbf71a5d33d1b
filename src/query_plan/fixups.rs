//! Null-ambiguity fix-up.
//!
//! On an outer-joined table `b.notes IS NULL` also matches parents with no
//! `b` row at all. Conjoining `b.id IS NOT NULL` restricts it to "the row
//! exists and its column is null". Id columns and injected (pruneable)
//! conditions are left alone.

use std::collections::{HashMap, HashSet};

use crate::filter::ValueFilter;

use super::errors::PlanError;
use super::visitor::{visit, ConditionVisitor, VisitAction};
use super::{ColumnCondition, Expression, JoinType, QueryPlan, Table};

struct NullIdCheck<'a> {
    outer: HashSet<String>,
    id_db_types: &'a HashMap<String, String>,
    added: usize,
}

impl ConditionVisitor for NullIdCheck<'_> {
    fn visit_column(&mut self, condition: &ColumnCondition) -> VisitAction {
        if condition.pruneable
            || condition.column == "id"
            || condition.cond != ValueFilter::IsNull
            || !self.outer.contains(&condition.alias)
        {
            return VisitAction::Keep;
        }
        let db_type = self
            .id_db_types
            .get(&condition.alias)
            .map(String::as_str)
            .unwrap_or("int");
        self.added += 1;
        VisitAction::Replace(Expression::and(vec![
            Expression::Column(condition.clone()),
            ColumnCondition::new(&condition.alias, "id", db_type, ValueFilter::NotNull).into(),
        ]))
    }
}

fn outer_joined_aliases(plan: &QueryPlan, out: &mut HashSet<String>) {
    for table in &plan.tables {
        if let Table::Join(join) = table {
            if join.join_type == JoinType::Outer {
                out.insert(join.alias.clone());
            }
        }
    }
    for nested in plan.nested_plans() {
        outer_joined_aliases(nested, out);
    }
}

pub(super) fn add_null_id_checks(
    plan: &mut QueryPlan,
    id_db_types: &HashMap<String, String>,
) -> Result<(), PlanError> {
    let mut outer = HashSet::new();
    outer_joined_aliases(plan, &mut outer);
    if outer.is_empty() {
        return Ok(());
    }
    let mut check = NullIdCheck {
        outer,
        id_db_types,
        added: 0,
    };
    visit(plan, &mut check)?;
    log::debug!("added {} null-id disambiguation check(s)", check.added);
    Ok(())
}
