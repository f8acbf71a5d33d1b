//! Relational query plan.
//!
//! A [`QueryPlan`] is plain data: the plan builder produces it from a filter
//! literal, the rewrite passes mutate it in place, and an executor (or
//! [`crate::sql_generator`]) renders it. Nested subqueries (`EXISTS`
//! conditions and `LATERAL` tables) are owned plans of the same shape.

pub mod alias_assigner;
pub mod condition_builder;
pub mod errors;
mod fixups;
mod ids;
mod ordering;
pub mod plan_builder;
pub mod visitor;

#[cfg(test)]
mod tests;

pub use alias_assigner::AliasAssigner;
pub use condition_builder::ConditionBuilder;
pub use errors::PlanError;
pub use plan_builder::{parse_find_query, FindOptions, SoftDeletes};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::{BoolOp, SortDirection, Value, ValueFilter};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Default)]
pub struct QueryPlan {
    pub selects: Vec<SelectItem>,
    /// FROM clause in dependency order; exactly one `Primary`
    pub tables: Vec<Table>,
    /// Root is always an AND/OR node
    pub condition: Option<ExpressionFilter>,
    pub order_bys: Vec<ParsedOrderBy>,
    pub group_bys: Option<Vec<GroupBy>>,
    pub ctes: Option<Vec<Cte>>,
}

impl QueryPlan {
    pub fn primary(&self) -> Option<&PrimaryTable> {
        self.tables.iter().find_map(|t| match t {
            Table::Primary(p) => Some(p),
            _ => None,
        })
    }

    pub fn primary_alias(&self) -> Option<&str> {
        self.primary().map(|p| p.alias.as_str())
    }

    pub fn table(&self, alias: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.alias() == alias)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.table(alias).is_some()
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinTable> {
        self.tables.iter().filter_map(|t| match t {
            Table::Join(j) => Some(j),
            _ => None,
        })
    }

    /// AND `expression` into the top-level condition.
    pub fn add_condition(&mut self, expression: Expression) {
        match self.condition.take() {
            None => self.condition = Some(ExpressionFilter::and(vec![expression])),
            Some(mut root) if root.op == BoolOp::And => {
                root.conditions.push(expression);
                self.condition = Some(root);
            }
            Some(root) => {
                self.condition = Some(ExpressionFilter::and(vec![Expression::Exp(root), expression]))
            }
        }
    }

    /// Plans owned by this one: lateral tables and `EXISTS` conditions
    /// anywhere in the condition tree or select list.
    pub fn nested_plans(&self) -> Vec<&QueryPlan> {
        let mut out = vec![];
        for table in &self.tables {
            if let Table::Lateral(lateral) = table {
                out.push(lateral.query.as_ref());
            }
        }
        if let Some(condition) = &self.condition {
            condition.collect_nested_plans(&mut out);
        }
        for select in &self.selects {
            if let SelectItem::BoolOr { condition, .. } = select {
                condition.collect_nested_plans(&mut out);
            }
        }
        out
    }

    /// Every table alias in this plan and all nested plans.
    pub fn all_table_aliases(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.tables.iter().map(|t| t.alias()).collect();
        for nested in self.nested_plans() {
            out.extend(nested.all_table_aliases());
        }
        out
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Table {
    Primary(PrimaryTable),
    Join(JoinTable),
    /// Unconditional join, used when batching several queries into one
    Cross(CrossTable),
    Lateral(LateralTable),
}

impl Table {
    pub fn alias(&self) -> &str {
        match self {
            Table::Primary(t) => &t.alias,
            Table::Join(t) => &t.alias,
            Table::Cross(t) => &t.alias,
            Table::Lateral(t) => &t.alias,
        }
    }

    /// Alias this table's join condition reaches into, if any
    pub fn parent_alias(&self) -> Option<&str> {
        match self {
            Table::Join(j) => Some(&j.col1.alias),
            Table::Lateral(l) => Some(&l.from_alias),
            Table::Primary(_) | Table::Cross(_) => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PrimaryTable {
    pub alias: String,
    pub table: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CrossTable {
    pub alias: String,
    pub table: String,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Outer,
}

/// `JOIN table AS alias ON col1 = col2`, where `col1` is on the already-joined
/// (parent) side and `col2` on this table.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct JoinTable {
    pub alias: String,
    pub table: String,
    pub join_type: JoinType,
    pub col1: ColumnRef,
    pub col2: ColumnRef,
    /// Inheritance joins are `Some(false)`: they never multiply rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
}

impl JoinTable {
    pub fn parent_alias(&self) -> &str {
        &self.col1.alias
    }
}

/// `CROSS JOIN LATERAL (query) AS alias`, correlated to `from_alias`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LateralTable {
    pub alias: String,
    pub from_alias: String,
    pub query: Box<QueryPlan>,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: &str, column: &str) -> Self {
        ColumnRef {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.column)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Exp(ExpressionFilter),
    Column(ColumnCondition),
    Raw(RawCondition),
    Exists(ExistsCondition),
}

impl Expression {
    pub fn and(conditions: Vec<Expression>) -> Self {
        Expression::Exp(ExpressionFilter::and(conditions))
    }

    pub fn or(conditions: Vec<Expression>) -> Self {
        Expression::Exp(ExpressionFilter::or(conditions))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Exp(e) if e.op == BoolOp::And => "and",
            Expression::Exp(_) => "or",
            Expression::Column(_) => "column",
            Expression::Raw(_) => "raw",
            Expression::Exists(_) => "exists",
        }
    }

    /// Aliases this expression reaches into from its own scope. An `EXISTS`
    /// only reaches its correlated outer aliases.
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            Expression::Exp(e) => e.aliases(),
            Expression::Column(c) => vec![c.alias.as_str()],
            Expression::Raw(r) => r.aliases.iter().map(String::as_str).collect(),
            Expression::Exists(e) => e.outer_aliases.iter().map(String::as_str).collect(),
        }
    }

    /// System-injected leaf (soft-delete, discriminator)
    pub fn is_pruneable(&self) -> bool {
        match self {
            Expression::Column(c) => c.pruneable,
            Expression::Raw(r) => r.pruneable,
            Expression::Exp(_) | Expression::Exists(_) => false,
        }
    }

    fn collect_nested_plans<'a>(&'a self, out: &mut Vec<&'a QueryPlan>) {
        match self {
            Expression::Exp(e) => e.collect_nested_plans(out),
            Expression::Exists(e) => out.push(e.query.as_ref()),
            Expression::Column(_) | Expression::Raw(_) => {}
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExpressionFilter {
    pub op: BoolOp,
    pub conditions: Vec<Expression>,
}

impl ExpressionFilter {
    pub fn and(conditions: Vec<Expression>) -> Self {
        ExpressionFilter {
            op: BoolOp::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<Expression>) -> Self {
        ExpressionFilter {
            op: BoolOp::Or,
            conditions,
        }
    }

    pub fn aliases(&self) -> Vec<&str> {
        let mut out = vec![];
        for c in &self.conditions {
            for alias in c.aliases() {
                if !out.contains(&alias) {
                    out.push(alias);
                }
            }
        }
        out
    }

    fn collect_nested_plans<'a>(&'a self, out: &mut Vec<&'a QueryPlan>) {
        for c in &self.conditions {
            c.collect_nested_plans(out);
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ColumnCondition {
    pub alias: String,
    pub column: String,
    pub db_type: String,
    pub cond: ValueFilter,
    #[serde(default)]
    pub pruneable: bool,
}

impl ColumnCondition {
    pub fn new(alias: &str, column: &str, db_type: &str, cond: ValueFilter) -> Self {
        ColumnCondition {
            alias: alias.to_string(),
            column: column.to_string(),
            db_type: db_type.to_string(),
            cond,
            pruneable: false,
        }
    }

    pub fn pruneable(mut self) -> Self {
        self.pruneable = true;
        self
    }
}

impl From<ColumnCondition> for Expression {
    fn from(c: ColumnCondition) -> Self {
        Expression::Column(c)
    }
}

/// Opaque SQL fragment. `aliases` must list every alias the text mentions;
/// scope analysis cannot look inside `condition`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct RawCondition {
    pub aliases: Vec<String>,
    pub condition: String,
    #[serde(default)]
    pub bindings: Vec<Value>,
    #[serde(default)]
    pub pruneable: bool,
}

impl RawCondition {
    pub fn new(aliases: Vec<String>, condition: String) -> Self {
        RawCondition {
            aliases,
            condition,
            bindings: vec![],
            pruneable: false,
        }
    }

    /// `col1 = col2` correlation between two tables
    pub fn correlation(col1: &ColumnRef, col2: &ColumnRef) -> Self {
        RawCondition::new(
            vec![col1.alias.clone(), col2.alias.clone()],
            format!("{col1} = {col2}"),
        )
    }
}

impl From<RawCondition> for Expression {
    fn from(r: RawCondition) -> Self {
        Expression::Raw(r)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExistsCondition {
    pub query: Box<QueryPlan>,
    pub negate: bool,
    /// Aliases of the enclosing plan the subquery correlates with
    pub outer_aliases: Vec<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectItem {
    /// `alias.*`
    Star { alias: String },
    Column {
        column: ColumnRef,
        col_alias: Option<String>,
    },
    /// Concrete class of a class-table-inheritance row: the first subtype
    /// alias whose id is non-null, else `default_type`
    Discriminator {
        cases: Vec<DiscriminatorCase>,
        default_type: String,
        col_alias: String,
    },
    /// `bool_or(condition)` over the correlated child rows
    BoolOr {
        condition: ExpressionFilter,
        col_alias: String,
    },
    /// `count(*) = 0` over the correlated child rows
    CountIsZero { col_alias: String },
    Raw {
        sql: String,
        aliases: Vec<String>,
        col_alias: Option<String>,
    },
}

impl SelectItem {
    pub fn star(alias: &str) -> Self {
        SelectItem::Star {
            alias: alias.to_string(),
        }
    }

    /// Aliases the select expression reads from
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            SelectItem::Star { alias } => vec![alias.as_str()],
            SelectItem::Column { column, .. } => vec![column.alias.as_str()],
            SelectItem::Discriminator { cases, .. } => {
                cases.iter().map(|c| c.alias.as_str()).collect()
            }
            SelectItem::BoolOr { condition, .. } => condition.aliases(),
            SelectItem::CountIsZero { .. } => vec![],
            SelectItem::Raw { aliases, .. } => aliases.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DiscriminatorCase {
    pub alias: String,
    pub type_name: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ParsedOrderBy {
    pub alias: String,
    pub column: String,
    pub order: SortDirection,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct GroupBy {
    pub alias: String,
    pub column: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Cte {
    pub alias: String,
    pub sql: String,
    #[serde(default)]
    pub bindings: Vec<Value>,
}

/// A one-to-many or many-to-many join recorded for the rewrite passes.
/// Not part of the plan itself.
#[derive(Debug, PartialEq, Clone)]
pub struct CollectionJoin {
    pub parent_alias: String,
    pub join: JoinTable,
}
