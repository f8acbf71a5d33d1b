//! Read/replace/delete traversal over a plan's condition trees.
//!
//! One [`visit`] call walks the top-level condition, every `EXISTS`
//! subquery, every `LATERAL` subquery and every `bool_or` select condition,
//! each as an independent root. Handlers return a [`VisitAction`]; replacements
//! and deletions are applied to the parent's child list, with deletions
//! batched until the sibling scan completes.
//!
//! ```ignore
//! struct DropPruneable;
//!
//! impl ConditionVisitor for DropPruneable {
//!     fn visit_column(&mut self, c: &ColumnCondition) -> VisitAction {
//!         if c.pruneable { VisitAction::Delete } else { VisitAction::Keep }
//!     }
//! }
//!
//! visit(&mut plan, &mut DropPruneable)?;
//! ```

use super::errors::PlanError;
use super::{
    ColumnCondition, Expression, ExpressionFilter, QueryPlan, RawCondition, SelectItem, Table,
};

#[derive(Debug, Clone, PartialEq)]
pub enum VisitAction {
    Keep,
    Replace(Expression),
    Delete,
}

pub trait ConditionVisitor {
    fn visit_column(&mut self, condition: &ColumnCondition) -> VisitAction;

    /// Called before an AND/OR node's children are visited. Returning
    /// anything but `Keep` skips the children.
    fn visit_expr(&mut self, _expression: &ExpressionFilter) -> VisitAction {
        VisitAction::Keep
    }

    fn visit_raw(&mut self, _condition: &RawCondition) -> VisitAction {
        VisitAction::Keep
    }
}

pub fn visit<V: ConditionVisitor>(plan: &mut QueryPlan, visitor: &mut V) -> Result<(), PlanError> {
    if let Some(condition) = plan.condition.as_mut() {
        visit_root(condition, visitor)?;
    }
    for table in plan.tables.iter_mut() {
        if let Table::Lateral(lateral) = table {
            visit(&mut lateral.query, visitor)?;
        }
    }
    for select in plan.selects.iter_mut() {
        if let SelectItem::BoolOr { condition, .. } = select {
            visit_root(condition, visitor)?;
        }
    }
    Ok(())
}

fn visit_root<V: ConditionVisitor>(
    root: &mut ExpressionFilter,
    visitor: &mut V,
) -> Result<(), PlanError> {
    match visitor.visit_expr(root) {
        VisitAction::Keep => visit_children(root, visitor),
        VisitAction::Replace(_) | VisitAction::Delete => {
            let kind = Expression::Exp(ExpressionFilter {
                op: root.op,
                conditions: vec![],
            })
            .kind();
            Err(PlanError::VisitorRootReplacement(kind.to_string()))
        }
    }
}

fn visit_children<V: ConditionVisitor>(
    parent: &mut ExpressionFilter,
    visitor: &mut V,
) -> Result<(), PlanError> {
    let mut deletes = vec![];
    for (i, child) in parent.conditions.iter_mut().enumerate() {
        let action = match child {
            Expression::Column(c) => visitor.visit_column(c),
            Expression::Raw(r) => visitor.visit_raw(r),
            Expression::Exp(e) => {
                let action = visitor.visit_expr(e);
                if action == VisitAction::Keep {
                    visit_children(e, visitor)?;
                }
                action
            }
            Expression::Exists(e) => {
                visit(&mut e.query, visitor)?;
                VisitAction::Keep
            }
        };
        match action {
            VisitAction::Keep => {}
            VisitAction::Replace(replacement) => *child = replacement,
            VisitAction::Delete => deletes.push(i),
        }
    }
    for i in deletes.into_iter().rev() {
        parent.conditions.remove(i);
    }
    Ok(())
}
