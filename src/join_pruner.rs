//! Removal of joins nothing refers to.

use std::collections::HashSet;

use crate::query_plan::errors::PlanError;
use crate::query_plan::visitor::{visit, ConditionVisitor, VisitAction};
use crate::query_plan::{
    ColumnCondition, Expression, ExpressionFilter, QueryPlan, RawCondition, SelectItem, Table,
};

pub trait JoinPruner {
    /// Remove join tables whose alias is neither referenced by the plan nor
    /// listed in `keep_aliases`.
    fn prune(&self, plan: &mut QueryPlan, keep_aliases: &HashSet<String>) -> Result<(), PlanError>;
}

/// Removes joins by alias reference counting, to a fixpoint.
///
/// A table is referenced by selects, non-pruneable conditions, order-bys,
/// group-bys, the join condition of another table, and any correlation of a
/// nested subquery. Pruneable conditions never keep a table alive and are
/// dropped together with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasReferencePruner;

impl JoinPruner for AliasReferencePruner {
    fn prune(&self, plan: &mut QueryPlan, keep_aliases: &HashSet<String>) -> Result<(), PlanError> {
        loop {
            let referenced = referenced_aliases(plan, keep_aliases);
            let removed: HashSet<String> = plan
                .tables
                .iter()
                .filter(|t| !matches!(t, Table::Primary(_)))
                .map(|t| t.alias().to_string())
                .filter(|alias| !referenced.contains(alias))
                .collect();
            if removed.is_empty() {
                break;
            }
            log::trace!("pruning joins {:?}", removed);
            plan.tables.retain(|t| !removed.contains(t.alias()));
            visit(plan, &mut DropPruneables { removed: &removed })?;
            if plan
                .condition
                .as_ref()
                .is_some_and(|c| c.conditions.is_empty())
            {
                plan.condition = None;
            }
        }

        let nested = HashSet::new();
        for table in plan.tables.iter_mut() {
            if let Table::Lateral(lateral) = table {
                self.prune(&mut lateral.query, &nested)?;
            }
        }
        let mut exists = vec![];
        if let Some(condition) = plan.condition.as_mut() {
            exists_plans_mut(condition, &mut exists);
        }
        for query in exists {
            self.prune(query, &nested)?;
        }
        Ok(())
    }
}

struct DropPruneables<'a> {
    removed: &'a HashSet<String>,
}

impl ConditionVisitor for DropPruneables<'_> {
    fn visit_column(&mut self, condition: &ColumnCondition) -> VisitAction {
        if condition.pruneable && self.removed.contains(&condition.alias) {
            VisitAction::Delete
        } else {
            VisitAction::Keep
        }
    }

    fn visit_raw(&mut self, condition: &RawCondition) -> VisitAction {
        if condition.pruneable && condition.aliases.iter().any(|a| self.removed.contains(a)) {
            VisitAction::Delete
        } else {
            VisitAction::Keep
        }
    }
}

fn exists_plans_mut<'a>(condition: &'a mut ExpressionFilter, out: &mut Vec<&'a mut QueryPlan>) {
    for child in condition.conditions.iter_mut() {
        match child {
            Expression::Exp(e) => exists_plans_mut(e, out),
            Expression::Exists(e) => out.push(e.query.as_mut()),
            Expression::Column(_) | Expression::Raw(_) => {}
        }
    }
}

fn referenced_aliases(plan: &QueryPlan, keep_aliases: &HashSet<String>) -> HashSet<String> {
    let mut referenced: HashSet<String> = keep_aliases.clone();
    let mut add = |alias: &str| {
        referenced.insert(alias.to_string());
    };
    collect_plan_references(plan, &mut add);
    referenced
}

/// Aliases `plan` needs, including everything its subqueries reach into
fn collect_plan_references(plan: &QueryPlan, add: &mut impl FnMut(&str)) {
    for select in &plan.selects {
        match select {
            SelectItem::BoolOr { condition, .. } => collect_condition_references(condition, add),
            other => other.aliases().into_iter().for_each(&mut *add),
        }
    }
    if let Some(condition) = &plan.condition {
        collect_condition_references(condition, add);
    }
    for order_by in &plan.order_bys {
        add(&order_by.alias);
    }
    for group_by in plan.group_bys.iter().flatten() {
        add(&group_by.alias);
    }
    for table in &plan.tables {
        match table {
            Table::Join(join) => add(join.parent_alias()),
            Table::Lateral(lateral) => {
                add(&lateral.from_alias);
                collect_plan_references(&lateral.query, add);
            }
            Table::Primary(_) | Table::Cross(_) => {}
        }
    }
}

fn collect_condition_references(condition: &ExpressionFilter, add: &mut impl FnMut(&str)) {
    for child in &condition.conditions {
        match child {
            Expression::Exp(e) => collect_condition_references(e, add),
            Expression::Column(c) if !c.pruneable => add(&c.alias),
            Expression::Raw(r) if !r.pruneable => r.aliases.iter().for_each(|a| add(a)),
            Expression::Column(_) | Expression::Raw(_) => {}
            Expression::Exists(e) => {
                e.outer_aliases.iter().for_each(|a| add(a));
                collect_plan_references(&e.query, add);
            }
        }
    }
}
