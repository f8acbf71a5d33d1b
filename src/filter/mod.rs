//! Typed filter literals.
//!
//! A find call is described by an [`EntityFilter`] (match criteria keyed by
//! field name, nesting through relations), an optional [`ExpressionLiteral`]
//! over alias bindings, and an [`OrderByLiteral`]. The shape of each field
//! value is decided once, when the literal is built (see [`json`]), so the
//! plan builder matches on [`FilterValue`] instead of probing shapes.

pub mod errors;
pub mod json;
mod value;

pub use errors::FilterError;
pub use value::Value;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Field present but unset; dropped without producing a condition
    Undefined,
    /// `{ firstName: "a1" }`, `{ publisher: "p:1" }`, `{ books: null }`
    Scalar(Value),
    /// `{ id: ["a:1", "a:2"] }`
    List(Vec<Value>),
    /// `{ age: { gt: 1, lt: 5 } }`
    Ops(Vec<ValueFilter>),
    /// `{ books: { title: "b1" } }`
    SubFilter(EntityFilter),
    /// `{ books: b }` binds the joined books table to the user alias `b`
    AliasBinding(String),
}

/// Match criteria for one entity, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityFilter {
    /// User alias bound to this entity's table, e.g. `{ as: b, title: ... }`
    pub alias: Option<String>,
    pub fields: Vec<(String, FilterValue)>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, value: FilterValue) -> Self {
        self.fields.push((name.to_string(), value));
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Names of fields that carry an actual value
    pub fn defined_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, v)| !matches!(v, FilterValue::Undefined))
            .map(|(k, _)| k.as_str())
    }
}

/// Predicate applied to a single column. Closed set: every consumer matches
/// on it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValueFilter {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    IsNull,
    NotNull,
    Like(String),
    Ilike(String),
    Nlike(String),
    Nilike(String),
    Regex(String),
    Iregex(String),
    Nregex(String),
    Niregex(String),
    Contains(Vec<Value>),
    Overlaps(Vec<Value>),
    ContainedBy(Vec<Value>),
    JsonPathExists(String),
    JsonPathPredicate(String),
}

impl ValueFilter {
    pub fn kind(&self) -> &'static str {
        match self {
            ValueFilter::Eq(_) => "eq",
            ValueFilter::Ne(_) => "ne",
            ValueFilter::In(_) => "in",
            ValueFilter::Nin(_) => "nin",
            ValueFilter::Gt(_) => "gt",
            ValueFilter::Gte(_) => "gte",
            ValueFilter::Lt(_) => "lt",
            ValueFilter::Lte(_) => "lte",
            ValueFilter::Between(_, _) => "between",
            ValueFilter::IsNull => "is-null",
            ValueFilter::NotNull => "not-null",
            ValueFilter::Like(_) => "like",
            ValueFilter::Ilike(_) => "ilike",
            ValueFilter::Nlike(_) => "nlike",
            ValueFilter::Nilike(_) => "nilike",
            ValueFilter::Regex(_) => "regex",
            ValueFilter::Iregex(_) => "iregex",
            ValueFilter::Nregex(_) => "nregex",
            ValueFilter::Niregex(_) => "niregex",
            ValueFilter::Contains(_) => "contains",
            ValueFilter::Overlaps(_) => "overlaps",
            ValueFilter::ContainedBy(_) => "contained-by",
            ValueFilter::JsonPathExists(_) => "json-path-exists",
            ValueFilter::JsonPathPredicate(_) => "json-path-predicate",
        }
    }

    /// `eq null` / `ne null` become explicit null checks.
    pub fn normalize(self) -> Self {
        match self {
            ValueFilter::Eq(Value::Null) => ValueFilter::IsNull,
            ValueFilter::Ne(Value::Null) => ValueFilter::NotNull,
            other => other,
        }
    }
}

impl FilterValue {
    /// The value filters a scalar/list/operator value stands for.
    /// Returns `None` for sub-filters and alias bindings.
    pub fn value_filters(&self) -> Option<Vec<ValueFilter>> {
        match self {
            FilterValue::Undefined => Some(vec![]),
            FilterValue::Scalar(v) => Some(vec![ValueFilter::Eq(v.clone()).normalize()]),
            FilterValue::List(values) => Some(vec![ValueFilter::In(values.clone())]),
            FilterValue::Ops(ops) => Some(ops.iter().cloned().map(ValueFilter::normalize).collect()),
            FilterValue::SubFilter(_) | FilterValue::AliasBinding(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneMode {
    /// Undefined branches are dropped individually
    #[default]
    Never,
    /// Any undefined branch collapses the whole expression to "no condition"
    Any,
}

/// User-supplied boolean expression over alias bindings, e.g.
/// `{ and: [b.title.like("b1%"), { or: [a.age.gt(40), undefined] }] }`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionLiteral {
    pub op: BoolOp,
    pub branches: Vec<ConditionLiteral>,
    pub prune_if_undefined: PruneMode,
}

impl ExpressionLiteral {
    pub fn and(branches: Vec<ConditionLiteral>) -> Self {
        ExpressionLiteral {
            op: BoolOp::And,
            branches,
            prune_if_undefined: PruneMode::Never,
        }
    }

    pub fn or(branches: Vec<ConditionLiteral>) -> Self {
        ExpressionLiteral {
            op: BoolOp::Or,
            branches,
            prune_if_undefined: PruneMode::Never,
        }
    }

    pub fn prune_if_any_undefined(mut self) -> Self {
        self.prune_if_undefined = PruneMode::Any;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionLiteral {
    Undefined,
    Column(AliasedCondition),
    Raw(RawLiteral),
    Nested(ExpressionLiteral),
}

impl ConditionLiteral {
    pub fn column(alias: &str, field: &str, filter: ValueFilter) -> Self {
        ConditionLiteral::Column(AliasedCondition {
            alias: alias.to_string(),
            field: field.to_string(),
            filter,
        })
    }
}

/// `alias.field <filter>`, where `alias` is a user binding name.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasedCondition {
    pub alias: String,
    pub field: String,
    pub filter: ValueFilter,
}

/// Opaque SQL fragment. `{name}` placeholders in `sql` are replaced by the
/// plan alias bound to `name`; `aliases` lists every binding it mentions.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLiteral {
    pub aliases: Vec<String>,
    pub sql: String,
    pub bindings: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByValue {
    Direction(SortDirection),
    /// Order through a many-to-one relation
    Nested(OrderByLiteral),
}

/// `{ last_name: ASC, publisher: { name: DESC } }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderByLiteral(pub Vec<(String, OrderByValue)>);

impl OrderByLiteral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(mut self, field: &str, direction: SortDirection) -> Self {
        self.0
            .push((field.to_string(), OrderByValue::Direction(direction)));
        self
    }

    pub fn nested(mut self, field: &str, nested: OrderByLiteral) -> Self {
        self.0.push((field.to_string(), OrderByValue::Nested(nested)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
