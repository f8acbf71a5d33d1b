//! Rewrite collection joins into `CROSS JOIN LATERAL` aggregates.
//!
//! Each rewritten collection gets one lateral subquery returning a
//! single row per parent. Every independent group of conditions against it
//! becomes one boolean column, and the outer condition refers to the
//! column instead:
//!
//! ```text
//! SELECT a.* FROM authors a
//! CROSS JOIN LATERAL (
//!   SELECT bool_or(b.title LIKE 'b1%') AS _c0, count(*) = 0 AS _c1
//!   FROM books b WHERE a.id = b.author_id
//! ) AS _b
//! WHERE _b._c0 OR _b._c1
//! ```
//!
//! Soft-delete and other pruneable conditions on the root guard each
//! `bool_or` group rather than the subquery's WHERE, so an anti-join group
//! sees the same rows as `NOT EXISTS`.
//!
//! By default only collections whose parent has several sibling collection
//! joins are rewritten, correlated to that parent; `force` rewrites every
//! root. Each group is evaluated over the child rows on its own, so two
//! groups against one collection may be satisfied by different rows.

use std::collections::{HashMap, HashSet};

use crate::filter::{BoolOp, ValueFilter};
use crate::query_plan::{
    AliasAssigner, CollectionJoin, Expression, ExpressionFilter, PlanError, QueryPlan,
    RawCondition, SelectItem, Table,
};

use super::{restore_top_level, subquery_tables, take_top_level, CollectionTree};

/// Columns and filters collected for one root's lateral subquery
struct LateralBuild {
    alias: String,
    selects: Vec<SelectItem>,
    pruneables: Vec<Expression>,
}

impl LateralBuild {
    /// Register `group` as a boolean column and return the outer reference to it
    fn add_group(&mut self, root: &str, group: Expression) -> Expression {
        let name = format!("_c{}", self.selects.len());
        let select = match group {
            Expression::Column(c)
                if c.alias == root && c.column == "id" && c.cond == ValueFilter::IsNull =>
            {
                SelectItem::CountIsZero {
                    col_alias: name.clone(),
                }
            }
            Expression::Exp(condition) => SelectItem::BoolOr {
                condition,
                col_alias: name.clone(),
            },
            other => SelectItem::BoolOr {
                condition: ExpressionFilter::and(vec![other]),
                col_alias: name.clone(),
            },
        };
        self.selects.push(select);
        RawCondition::new(vec![self.alias.clone()], format!("{}.{}", self.alias, name)).into()
    }

    /// Selects with the root's pruneable conditions AND-ed into every
    /// `bool_or` group. `count(*) = 0` counts every correlated row, like the
    /// `NOT EXISTS` anti-join.
    fn guarded_selects(self) -> Vec<SelectItem> {
        if self.pruneables.is_empty() {
            return self.selects;
        }
        let pruneables = self.pruneables;
        self.selects
            .into_iter()
            .map(|select| match select {
                SelectItem::BoolOr {
                    condition,
                    col_alias,
                } => {
                    let mut guarded = pruneables.clone();
                    match condition.op {
                        BoolOp::And => guarded.extend(condition.conditions),
                        BoolOp::Or => guarded.push(Expression::Exp(condition)),
                    }
                    SelectItem::BoolOr {
                        condition: ExpressionFilter::and(guarded),
                        col_alias,
                    }
                }
                other => other,
            })
            .collect()
    }
}

struct Scope<'t> {
    tree: &'t CollectionTree,
    /// Collections rewritten into laterals; none lies below another
    active: Vec<String>,
}

enum Slot {
    Keep(Expression),
    Group(String),
    Nested(ExpressionFilter),
}

impl Scope<'_> {
    fn unit_of(&self, alias: &str) -> Option<&str> {
        self.active
            .iter()
            .map(String::as_str)
            .find(|unit| self.tree.in_subtree(alias, unit))
    }

    /// Active collections referenced by `expression`, and whether it reaches
    /// anything else
    fn refs(&self, expression: &Expression) -> (Vec<String>, bool) {
        let mut units: Vec<String> = vec![];
        let mut outer = false;
        for alias in expression.aliases() {
            match self.unit_of(alias) {
                Some(unit) => {
                    if !units.iter().any(|u| u == unit) {
                        units.push(unit.to_string());
                    }
                }
                None => outer = true,
            }
        }
        (units, outer)
    }

    /// Active collections referenced by an opaque leaf that also reaches
    /// outside them. Such a leaf cannot move into a subquery, so the
    /// collection has to stay joined.
    fn pinned(&self, children: &[Expression], top_level: bool, out: &mut Vec<String>) {
        for child in children {
            if top_level && child.is_pruneable() {
                continue;
            }
            let (units, outer) = self.refs(child);
            if units.is_empty() || (units.len() == 1 && !outer) {
                continue;
            }
            match child {
                Expression::Exp(e) => self.pinned(&e.conditions, false, out),
                _ => {
                    for unit in units {
                        if !out.contains(&unit) {
                            out.push(unit);
                        }
                    }
                }
            }
        }
    }

    /// Replace every group of same-collection siblings with a reference to a
    /// boolean lateral column, numbering columns in condition order.
    fn decompose(
        &self,
        children: Vec<Expression>,
        op: BoolOp,
        top_level: bool,
        builds: &mut HashMap<String, LateralBuild>,
    ) -> Vec<Expression> {
        let mut slots = vec![];
        let mut buckets: HashMap<String, Vec<Expression>> = HashMap::new();
        for child in children {
            let (units, outer) = self.refs(&child);
            if top_level && child.is_pruneable() && units.len() == 1 {
                if let Some(build) = builds.get_mut(&units[0]) {
                    log::trace!("pruneable condition moves into lateral {}", build.alias);
                    build.pruneables.push(child);
                    continue;
                }
            }
            if units.is_empty() {
                slots.push(Slot::Keep(child));
            } else if units.len() == 1 && !outer {
                let unit = units[0].clone();
                if !buckets.contains_key(&unit) {
                    slots.push(Slot::Group(unit.clone()));
                }
                buckets.entry(unit).or_default().push(child);
            } else {
                match child {
                    Expression::Exp(e) => slots.push(Slot::Nested(e)),
                    other => slots.push(Slot::Keep(other)),
                }
            }
        }

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Keep(e) => out.push(e),
                Slot::Nested(e) => {
                    let conditions = self.decompose(e.conditions, e.op, false, builds);
                    out.push(Expression::Exp(ExpressionFilter {
                        op: e.op,
                        conditions,
                    }));
                }
                Slot::Group(unit) => {
                    let mut members = buckets.remove(&unit).unwrap_or_default();
                    let group = if members.len() == 1 {
                        members.remove(0)
                    } else {
                        Expression::Exp(ExpressionFilter {
                            op,
                            conditions: members,
                        })
                    };
                    out.push(match builds.get_mut(&unit) {
                        Some(build) => build.add_group(&unit, group),
                        None => group,
                    });
                }
            }
        }
        out
    }
}

/// Collections whose parent has at least `sibling_threshold` collection
/// joins, or every collection when `force` is set
fn eligible_collections(tree: &CollectionTree, force: bool, sibling_threshold: usize) -> Vec<&str> {
    let mut siblings: HashMap<&str, usize> = HashMap::new();
    for collection in tree.collections() {
        if let Some(cj) = tree.join(collection) {
            *siblings.entry(cj.join.parent_alias()).or_insert(0) += 1;
        }
    }
    tree.collections()
        .filter(|collection| {
            force
                || tree
                    .join(collection)
                    .and_then(|cj| siblings.get(cj.join.parent_alias()))
                    .is_some_and(|n| *n >= sibling_threshold)
        })
        .collect()
}

/// Topmost eligible collections not in `excluded`. Eligible collections
/// below a chosen one are rewritten inside its subquery.
fn select_units(tree: &CollectionTree, eligible: &[&str], excluded: &[String]) -> Vec<String> {
    let mut units: Vec<String> = vec![];
    for collection in tree.collections() {
        if !eligible.contains(&collection) || excluded.iter().any(|e| e == collection) {
            continue;
        }
        if units.iter().any(|unit| tree.in_subtree(collection, unit)) {
            continue;
        }
        units.push(collection.to_string());
    }
    units
}

pub fn rewrite(
    plan: &mut QueryPlan,
    force: bool,
    sibling_threshold: usize,
    collection_joins: &[CollectionJoin],
    assigner: &mut AliasAssigner,
) -> Result<(), PlanError> {
    let tree = CollectionTree::new(plan, collection_joins);
    if tree.is_empty() {
        return Ok(());
    }
    let eligible = eligible_collections(&tree, force, sibling_threshold);
    if eligible.is_empty() {
        log::debug!("no collection joins meet the lateral threshold");
        return Ok(());
    }

    let (top, was_or) = take_top_level(plan);
    // A pinned collection stays a join and may let eligible collections
    // below it take its place, so repeat until stable
    let mut excluded: Vec<String> = vec![];
    let scope = loop {
        let scope = Scope {
            tree: &tree,
            active: select_units(&tree, &eligible, &excluded),
        };
        for condition in &top {
            check_raw_spans(&scope, condition)?;
        }
        let mut pinned = vec![];
        scope.pinned(&top, true, &mut pinned);
        if pinned.is_empty() {
            break scope;
        }
        for collection in &pinned {
            log::warn!(
                "collection join `{}` is referenced together with outer tables, keeping it as a join",
                collection
            );
        }
        excluded.extend(pinned);
    };
    if scope.active.is_empty() {
        restore_top_level(plan, top, was_or);
        return Ok(());
    }

    let mut builds: HashMap<String, LateralBuild> = HashMap::new();
    for unit in &scope.active {
        builds.insert(
            unit.clone(),
            LateralBuild {
                alias: assigner.literal_alias(&format!("_{unit}")),
                selects: vec![],
                pruneables: vec![],
            },
        );
    }
    let mut outer = scope.decompose(top, BoolOp::And, true, &mut builds);

    for unit in &scope.active {
        let (Some(build), Some(cj)) = (builds.remove(unit), tree.join(unit)) else {
            continue;
        };
        if build.selects.is_empty() {
            outer.extend(build.pruneables);
            continue;
        }
        let lateral_alias = build.alias.clone();
        let subtree: HashSet<&str> = tree.subtree(unit).into_iter().collect();
        let correlation: Expression = RawCondition::correlation(&cj.join.col1, &cj.join.col2).into();
        let query = QueryPlan {
            selects: build.guarded_selects(),
            tables: subquery_tables(plan, unit, &subtree),
            condition: Some(ExpressionFilter::and(vec![correlation])),
            ..Default::default()
        };
        log::trace!(
            "collection {} rewritten to lateral {} with {} column(s)",
            unit,
            lateral_alias,
            query.selects.len()
        );
        plan.tables.retain(|t| !subtree.contains(t.alias()));
        plan.tables.push(Table::Lateral(crate::query_plan::LateralTable {
            alias: lateral_alias,
            from_alias: cj.join.parent_alias().to_string(),
            query: Box::new(query),
        }));
    }

    restore_top_level(plan, outer, was_or);
    Ok(())
}

fn check_raw_spans(scope: &Scope<'_>, condition: &Expression) -> Result<(), PlanError> {
    match condition {
        Expression::Raw(raw) => {
            let (roots, _) = scope.refs(condition);
            if roots.len() > 1 {
                return Err(PlanError::RawSpansRoots {
                    condition: raw.condition.clone(),
                    roots,
                });
            }
            Ok(())
        }
        Expression::Exp(e) => e
            .conditions
            .iter()
            .try_for_each(|c| check_raw_spans(scope, c)),
        Expression::Column(_) | Expression::Exists(_) => Ok(()),
    }
}
