//! Collection-join rewrite passes.
//!
//! One-to-many and many-to-many joins multiply the primary row. After the
//! plan builder has recorded them, one of two passes rewrites them away:
//!
//! - [`exists`]: each collection root becomes a correlated `EXISTS` /
//!   `NOT EXISTS` condition
//! - [`lateral`]: each collection root becomes a `CROSS JOIN LATERAL`
//!   aggregate exposing one boolean column per condition group
//!
//! Both passes share the ownership map in [`CollectionTree`], built once per
//! rewrite and never mutated.

pub mod exists;
pub mod lateral;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::BoolOp;
use crate::query_plan::{
    AliasAssigner, CollectionJoin, Expression, ExpressionFilter, PlanError, PrimaryTable,
    QueryPlan, Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    #[default]
    Exists,
    /// `force` rewrites every collection root, not only parents with enough
    /// sibling collections
    Lateral {
        #[serde(default)]
        force: bool,
    },
    /// Leave collection joins as ordinary outer joins
    None,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Unknown join strategy `{0}`, expected exists, lateral, lateral:force or none")]
pub struct ParseJoinStrategyError(String);

impl FromStr for JoinStrategy {
    type Err = ParseJoinStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exists" => Ok(JoinStrategy::Exists),
            "lateral" => Ok(JoinStrategy::Lateral { force: false }),
            "lateral:force" => Ok(JoinStrategy::Lateral { force: true }),
            "none" => Ok(JoinStrategy::None),
            _ => Err(ParseJoinStrategyError(s.to_string())),
        }
    }
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::Exists => write!(f, "exists"),
            JoinStrategy::Lateral { force: false } => write!(f, "lateral"),
            JoinStrategy::Lateral { force: true } => write!(f, "lateral:force"),
            JoinStrategy::None => write!(f, "none"),
        }
    }
}

/// Apply `strategy` to the recorded collection joins.
pub fn rewrite_collection_joins(
    plan: &mut QueryPlan,
    collection_joins: &[CollectionJoin],
    strategy: JoinStrategy,
    lateral_sibling_threshold: usize,
    assigner: &mut AliasAssigner,
) -> Result<(), PlanError> {
    if collection_joins.is_empty() {
        return Ok(());
    }
    log::debug!(
        "rewriting {} collection join(s) with strategy {}",
        collection_joins.len(),
        strategy
    );
    match strategy {
        JoinStrategy::Exists => exists::rewrite(plan, collection_joins),
        JoinStrategy::Lateral { force } => lateral::rewrite(
            plan,
            force,
            lateral_sibling_threshold,
            collection_joins,
            assigner,
        ),
        JoinStrategy::None => Ok(()),
    }
}

/// Which collection join owns each table alias.
///
/// A collection join whose parent chain contains no other collection join is
/// a root; one below another collection is nested under it. Every alias is
/// owned by its nearest collection ancestor (or itself), and belongs to the
/// subtree of the topmost one.
#[derive(Debug, Clone)]
pub struct CollectionTree {
    /// Collection aliases, in plan order
    collections: Vec<String>,
    joins: HashMap<String, CollectionJoin>,
    /// Table aliases in plan order
    aliases: Vec<String>,
    parent_of: HashMap<String, String>,
    nearest: HashMap<String, String>,
    root_of: HashMap<String, String>,
}

impl CollectionTree {
    pub fn new(plan: &QueryPlan, collection_joins: &[CollectionJoin]) -> Self {
        let joins: HashMap<String, CollectionJoin> = collection_joins
            .iter()
            .filter(|cj| plan.has_alias(&cj.join.alias))
            .map(|cj| (cj.join.alias.clone(), cj.clone()))
            .collect();
        let mut aliases = vec![];
        let mut parent_of = HashMap::new();
        for table in &plan.tables {
            aliases.push(table.alias().to_string());
            if let Some(parent) = table.parent_alias() {
                parent_of.insert(table.alias().to_string(), parent.to_string());
            }
        }
        let collections: Vec<String> = aliases
            .iter()
            .filter(|a| joins.contains_key(*a))
            .cloned()
            .collect();

        let mut nearest = HashMap::new();
        let mut root_of = HashMap::new();
        for alias in &aliases {
            let mut current = Some(alias.as_str());
            let mut seen = HashSet::new();
            while let Some(a) = current {
                if !seen.insert(a) {
                    break;
                }
                if joins.contains_key(a) {
                    nearest.entry(alias.clone()).or_insert_with(|| a.to_string());
                    root_of.insert(alias.clone(), a.to_string());
                }
                current = parent_of.get(a).map(String::as_str);
            }
        }

        CollectionTree {
            collections,
            joins,
            aliases,
            parent_of,
            nearest,
            root_of,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Collection aliases in plan order, parents before children
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }

    pub fn join(&self, collection: &str) -> Option<&CollectionJoin> {
        self.joins.get(collection)
    }

    /// Nearest collection alias at or above `alias`
    pub fn nearest_collection(&self, alias: &str) -> Option<&str> {
        self.nearest.get(alias).map(String::as_str)
    }

    /// Topmost collection alias at or above `alias`
    pub fn root_of(&self, alias: &str) -> Option<&str> {
        self.root_of.get(alias).map(String::as_str)
    }

    fn parent_collection(&self, collection: &str) -> Option<&str> {
        self.parent_of
            .get(collection)
            .and_then(|p| self.nearest_collection(p))
    }

    pub fn roots(&self) -> Vec<&str> {
        self.collections
            .iter()
            .map(String::as_str)
            .filter(|c| self.parent_collection(c).is_none())
            .collect()
    }

    /// Collections nested directly under `collection`
    pub fn children_of(&self, collection: &str) -> Vec<&str> {
        self.collections
            .iter()
            .map(String::as_str)
            .filter(|c| self.parent_collection(c) == Some(collection))
            .collect()
    }

    /// Aliases whose nearest collection is `collection`, in plan order
    pub fn owned_by(&self, collection: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .map(String::as_str)
            .filter(|a| self.nearest_collection(a) == Some(collection))
            .collect()
    }

    /// `alias` is `collection` or lies below it
    pub fn in_subtree(&self, alias: &str, collection: &str) -> bool {
        let mut current = self.nearest_collection(alias);
        while let Some(c) = current {
            if c == collection {
                return true;
            }
            current = self.parent_collection(c);
        }
        false
    }

    /// Every alias in `collection`'s subtree, in plan order
    pub fn subtree(&self, collection: &str) -> Vec<&str> {
        self.aliases
            .iter()
            .map(String::as_str)
            .filter(|a| self.in_subtree(a, collection))
            .collect()
    }

    /// Roots referenced by `expression`, and whether it also reaches aliases
    /// outside every collection
    pub fn roots_referenced(&self, expression: &Expression) -> (Vec<&str>, bool) {
        let mut roots: Vec<&str> = vec![];
        let mut outer = false;
        for alias in expression.aliases() {
            match self.root_of(alias) {
                Some(root) => {
                    if !roots.contains(&root) {
                        roots.push(root);
                    }
                }
                None => outer = true,
            }
        }
        (roots, outer)
    }
}

/// Top-level conditions as a flat list of AND-ed children. An OR root stays
/// whole as a single child.
pub(crate) fn take_top_level(plan: &mut QueryPlan) -> (Vec<Expression>, bool) {
    match plan.condition.take() {
        None => (vec![], false),
        Some(root) if root.op == BoolOp::And => (root.conditions, false),
        Some(root) => (vec![Expression::Exp(root)], true),
    }
}

/// Reassemble what [`take_top_level`] split.
pub(crate) fn restore_top_level(plan: &mut QueryPlan, conditions: Vec<Expression>, was_or: bool) {
    plan.condition = match conditions.len() {
        0 => None,
        1 if was_or => match conditions.into_iter().next() {
            Some(Expression::Exp(root)) => Some(root),
            Some(other) => Some(ExpressionFilter::and(vec![other])),
            None => None,
        },
        _ => Some(ExpressionFilter::and(conditions)),
    };
}

/// Tables of `aliases` in plan order, with `root` turned into the primary
/// table of a subquery.
pub(crate) fn subquery_tables(plan: &QueryPlan, root: &str, aliases: &HashSet<&str>) -> Vec<Table> {
    plan.tables
        .iter()
        .filter(|t| aliases.contains(t.alias()))
        .map(|t| match t {
            Table::Join(j) if j.alias == root => {
                Table::Primary(PrimaryTable {
                    alias: j.alias.clone(),
                    table: j.table.clone(),
                })
            }
            other => other.clone(),
        })
        .collect()
}
