//! Merges condition sources into one AND-rooted tree.
//!
//! Sources, in output order: inline column and raw conditions, `EXISTS`
//! fragments, then parsed user expressions. The merge keeps nesting minimal:
//!
//! - only one expression and nothing inline: the expression itself
//! - one AND expression: its children are spliced next to the inline ones
//! - otherwise: one AND over everything

use crate::filter::{
    AliasedCondition, BoolOp, ConditionLiteral, ExpressionLiteral, PruneMode, RawLiteral, Value,
    ValueFilter,
};

use super::errors::PlanError;
use super::{ColumnCondition, ExistsCondition, Expression, ExpressionFilter, RawCondition};

/// Maps user alias bindings in an expression literal onto plan aliases.
pub trait ConditionResolver {
    fn resolve_column(&mut self, condition: &AliasedCondition) -> Result<ColumnCondition, PlanError>;

    fn resolve_raw(&mut self, raw: &RawLiteral) -> Result<RawCondition, PlanError>;
}

#[derive(Debug, Default)]
pub struct ConditionBuilder {
    conditions: Vec<Expression>,
    exists: Vec<Expression>,
    expressions: Vec<ExpressionFilter>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_simple_condition(&mut self, condition: ColumnCondition) {
        self.conditions.push(split_null_membership(condition));
    }

    pub fn add_raw_condition(&mut self, condition: RawCondition) {
        self.conditions.push(Expression::Raw(condition));
    }

    pub fn add_exists_condition(&mut self, condition: ExistsCondition) {
        self.exists.push(Expression::Exists(condition));
    }

    /// Already-built expression, e.g. a polymorphic fan-out
    pub fn add_parsed_expression(&mut self, expression: ExpressionFilter) {
        self.expressions.push(expression);
    }

    /// Parse and add a user expression literal. Literals that resolve to
    /// "no condition" add nothing.
    pub fn add_expression<R: ConditionResolver>(
        &mut self,
        literal: &ExpressionLiteral,
        resolver: &mut R,
    ) -> Result<(), PlanError> {
        if let Some(parsed) = parse_expression_literal(literal, resolver)? {
            self.add_parsed_expression(parsed);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.exists.is_empty() && self.expressions.is_empty()
    }

    pub fn to_expression(mut self) -> Option<ExpressionFilter> {
        if self.is_empty() {
            return None;
        }
        let exists = std::mem::take(&mut self.exists);
        self.conditions.extend(exists);
        if self.expressions.len() == 1 {
            if self.conditions.is_empty() {
                return self.expressions.pop();
            }
            if self.expressions[0].op == BoolOp::And {
                if let Some(only) = self.expressions.pop() {
                    self.conditions.extend(only.conditions);
                    return Some(ExpressionFilter::and(self.conditions));
                }
            }
        }
        let mut all = self.conditions;
        all.extend(self.expressions.into_iter().map(Expression::Exp));
        Some(ExpressionFilter::and(all))
    }
}

/// `IN` never matches NULL, so a list containing null becomes
/// `c IS NULL OR c IN (rest)`; `NOT IN` likewise becomes
/// `c IS NOT NULL AND c NOT IN (rest)`.
pub fn split_null_membership(condition: ColumnCondition) -> Expression {
    let split = match &condition.cond {
        ValueFilter::In(values) if values.iter().any(Value::is_null) => Some((values, false)),
        ValueFilter::Nin(values) if values.iter().any(Value::is_null) => Some((values, true)),
        _ => None,
    }
    .map(|(values, negated)| {
        let rest: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
        (rest, negated)
    });
    let Some((rest, negated)) = split else {
        return Expression::Column(condition);
    };
    let with = |cond: ValueFilter| ColumnCondition {
        cond,
        ..condition.clone()
    };
    let null_check = if negated {
        with(ValueFilter::NotNull)
    } else {
        with(ValueFilter::IsNull)
    };
    if rest.is_empty() {
        return Expression::Column(null_check);
    }
    if negated {
        Expression::and(vec![
            null_check.into(),
            with(ValueFilter::Nin(rest)).into(),
        ])
    } else {
        Expression::or(vec![null_check.into(), with(ValueFilter::In(rest)).into()])
    }
}

/// Recursively parse an `and`/`or` literal.
///
/// Undefined branches are dropped. With [`PruneMode::Any`], a single undefined
/// branch (including a nested expression that itself resolved to nothing)
/// turns the whole expression into "no condition".
pub fn parse_expression_literal<R: ConditionResolver>(
    literal: &ExpressionLiteral,
    resolver: &mut R,
) -> Result<Option<ExpressionFilter>, PlanError> {
    let mut conditions = vec![];
    let mut saw_undefined = false;
    for branch in &literal.branches {
        match branch {
            ConditionLiteral::Undefined => saw_undefined = true,
            ConditionLiteral::Column(c) => {
                conditions.push(split_null_membership(resolver.resolve_column(c)?));
            }
            ConditionLiteral::Raw(r) => {
                conditions.push(Expression::Raw(resolver.resolve_raw(r)?));
            }
            ConditionLiteral::Nested(nested) => match parse_expression_literal(nested, resolver)? {
                Some(parsed) => conditions.push(Expression::Exp(parsed)),
                None => saw_undefined = true,
            },
        }
    }
    if saw_undefined && literal.prune_if_undefined == PruneMode::Any {
        log::trace!("expression pruned: undefined branch with prune-if-any");
        return Ok(None);
    }
    if conditions.is_empty() {
        return Ok(None);
    }
    Ok(Some(ExpressionFilter {
        op: literal.op,
        conditions,
    }))
}
