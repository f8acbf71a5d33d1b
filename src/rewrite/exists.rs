//! Rewrite collection joins into correlated `EXISTS` subqueries.
//!
//! ```text
//! SELECT a.* FROM authors a
//!   LEFT OUTER JOIN books b ON a.id = b.author_id
//! WHERE b.title LIKE 'b1%'
//! ```
//!
//! becomes
//!
//! ```text
//! SELECT a.* FROM authors a
//! WHERE EXISTS (SELECT 1 FROM books b WHERE a.id = b.author_id AND b.title LIKE 'b1%')
//! ```
//!
//! Top-level conditions are routed to the collection root whose subtree they
//! reference. Anything that mixes a root with the outer scope stays outside
//! and taints that root, which then keeps its ordinary join.

use std::collections::{HashMap, HashSet};

use crate::filter::ValueFilter;
use crate::query_plan::{
    CollectionJoin, ExistsCondition, Expression, ExpressionFilter, PlanError, QueryPlan,
    RawCondition, SelectItem,
};

use super::{restore_top_level, subquery_tables, take_top_level, CollectionTree};

enum Outcome {
    Built(ExistsCondition),
    /// Nothing worth a subquery; hands back the conditions it was given
    Skipped(Vec<Expression>),
}

pub fn rewrite(plan: &mut QueryPlan, collection_joins: &[CollectionJoin]) -> Result<(), PlanError> {
    let tree = CollectionTree::new(plan, collection_joins);
    if tree.is_empty() {
        return Ok(());
    }
    let roots: Vec<String> = tree.roots().into_iter().map(String::from).collect();
    let (top, was_or) = take_top_level(plan);

    let mut outer = vec![];
    let mut routed: HashMap<String, Vec<Expression>> = HashMap::new();
    for condition in top {
        check_raw_spans(&tree, &condition)?;
        match route(&tree, &condition) {
            Some(root) => {
                log::trace!("routing {} condition to collection {}", condition.kind(), root);
                routed.entry(root).or_default().push(condition);
            }
            None => outer.push(condition),
        }
    }

    // Anything left outside that still reaches into a root keeps that root a join
    let mut tainted: Vec<String> = vec![];
    for condition in &outer {
        for root in tree.roots_referenced(condition).0 {
            if !tainted.iter().any(|t| t == root) {
                tainted.push(root.to_string());
            }
        }
    }
    for root in &tainted {
        log::warn!(
            "collection join `{}` is referenced outside its subquery, keeping it as a join",
            root
        );
        if let Some(conditions) = routed.remove(root) {
            outer.extend(conditions);
        }
    }

    let mut absorbed: HashSet<String> = HashSet::new();
    let mut exists_conditions = vec![];
    for root in &roots {
        if tainted.contains(root) {
            continue;
        }
        let conditions = routed.remove(root).unwrap_or_default();
        match build_exists(plan, &tree, root, conditions)? {
            Outcome::Built(exists) => {
                log::trace!(
                    "collection {} rewritten to {}EXISTS",
                    root,
                    if exists.negate { "NOT " } else { "" }
                );
                absorbed.extend(tree.subtree(root).into_iter().map(String::from));
                exists_conditions.push(Expression::Exists(exists));
            }
            Outcome::Skipped(conditions) => {
                log::trace!("collection {} has no conditions, leaving the join", root);
                outer.extend(conditions);
            }
        }
    }

    plan.tables.retain(|t| !absorbed.contains(t.alias()));
    outer.extend(exists_conditions);
    restore_top_level(plan, outer, was_or);
    Ok(())
}

/// Raw fragments are opaque, so one that spans two roots cannot be split.
fn check_raw_spans(tree: &CollectionTree, condition: &Expression) -> Result<(), PlanError> {
    match condition {
        Expression::Raw(raw) => {
            let (roots, _) = tree.roots_referenced(condition);
            if roots.len() > 1 {
                return Err(PlanError::RawSpansRoots {
                    condition: raw.condition.clone(),
                    roots: roots.into_iter().map(String::from).collect(),
                });
            }
            Ok(())
        }
        Expression::Exp(e) => e
            .conditions
            .iter()
            .try_for_each(|c| check_raw_spans(tree, c)),
        Expression::Column(_) | Expression::Exists(_) => Ok(()),
    }
}

/// The root a top-level condition belongs to, if it can move into that
/// root's subquery.
fn route(tree: &CollectionTree, condition: &Expression) -> Option<String> {
    let (roots, outer) = tree.roots_referenced(condition);
    if roots.len() != 1 {
        return None;
    }
    if condition.is_pruneable() || !outer {
        return Some(roots[0].to_string());
    }
    None
}

fn is_id_is_null(condition: &Expression, alias: &str) -> bool {
    matches!(
        condition,
        Expression::Column(c) if c.alias == alias && c.column == "id" && c.cond == ValueFilter::IsNull
    )
}

fn build_exists(
    plan: &QueryPlan,
    tree: &CollectionTree,
    collection: &str,
    conditions: Vec<Expression>,
) -> Result<Outcome, PlanError> {
    let Some(cj) = tree.join(collection) else {
        return Ok(Outcome::Skipped(conditions));
    };
    let original = conditions.clone();
    let children = tree.children_of(collection);

    let mut own = vec![];
    let mut per_child: HashMap<&str, Vec<Expression>> = HashMap::new();
    let mut tainted_children: Vec<&str> = vec![];
    for condition in conditions {
        let aliases = condition.aliases();
        let touched: Vec<&str> = children
            .iter()
            .copied()
            .filter(|child| aliases.iter().any(|a| tree.in_subtree(a, child)))
            .collect();
        let only_child = touched.len() == 1
            && aliases.iter().all(|a| tree.in_subtree(a, touched[0]));
        if only_child {
            per_child.entry(touched[0]).or_default().push(condition);
        } else {
            for child in touched {
                if !tainted_children.contains(&child) {
                    tainted_children.push(child);
                }
            }
            own.push(condition);
        }
    }
    for child in &tainted_children {
        if let Some(conditions) = per_child.remove(child) {
            own.extend(conditions);
        }
    }

    let mut nested = vec![];
    for child in &children {
        if tainted_children.contains(child) {
            continue;
        }
        let conditions = per_child.remove(child).unwrap_or_default();
        if let Outcome::Built(exists) = build_exists(plan, tree, child, conditions)? {
            nested.push(Expression::Exists(exists));
        }
    }

    let non_pruneable: Vec<&Expression> = own.iter().filter(|c| !c.is_pruneable()).collect();
    let correlation: Expression = RawCondition::correlation(&cj.join.col1, &cj.join.col2).into();
    let outer_aliases = vec![cj.join.col1.alias.clone()];

    if nested.is_empty()
        && tainted_children.is_empty()
        && non_pruneable.len() == 1
        && is_id_is_null(non_pruneable[0], collection)
    {
        let from: HashSet<&str> = [collection].into_iter().collect();
        return Ok(Outcome::Built(ExistsCondition {
            query: Box::new(subquery(plan, collection, &from, vec![correlation])),
            negate: true,
            outer_aliases,
        }));
    }
    if non_pruneable.is_empty() && nested.is_empty() {
        return Ok(Outcome::Skipped(original));
    }

    let mut from: HashSet<&str> = tree.owned_by(collection).into_iter().collect();
    for child in &tainted_children {
        from.extend(tree.subtree(child));
    }
    let mut where_conditions = vec![correlation];
    where_conditions.extend(own);
    where_conditions.extend(nested);
    Ok(Outcome::Built(ExistsCondition {
        query: Box::new(subquery(plan, collection, &from, where_conditions)),
        negate: false,
        outer_aliases,
    }))
}

fn subquery(
    plan: &QueryPlan,
    root: &str,
    aliases: &HashSet<&str>,
    conditions: Vec<Expression>,
) -> QueryPlan {
    QueryPlan {
        selects: vec![SelectItem::Raw {
            sql: "1".to_string(),
            aliases: vec![],
            col_alias: None,
        }],
        tables: subquery_tables(plan, root, aliases),
        condition: Some(ExpressionFilter::and(conditions)),
        ..Default::default()
    }
}
