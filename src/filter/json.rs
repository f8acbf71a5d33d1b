//! JSON boundary for filter literals.
//!
//! Shapes are inspected exactly once here; everything downstream matches on the
//! typed model.
//!
//! ```json
//! { "as": "a", "firstName": "a1", "age": { "gt": 40 },
//!   "books": { "as": "b", "title": { "like": "b1%" } },
//!   "publisher": "p:1", "tags": ["t:1", "t:2"], "mentor": null,
//!   "image": { "as": "i" } }
//! ```

use std::collections::HashSet;

use lazy_static::lazy_static;
use serde_json::{Map, Value as Json};

use super::errors::FilterError;
use super::{
    AliasedCondition, BoolOp, ConditionLiteral, EntityFilter, ExpressionLiteral, FilterValue,
    OrderByLiteral, OrderByValue, PruneMode, RawLiteral, SortDirection, Value, ValueFilter,
};

/// Key binding a user alias to the entity's table
const ALIAS_KEY: &str = "as";
/// `{ "$new": "Book" }` references an unsaved entity
const NEW_ENTITY_KEY: &str = "$new";

lazy_static! {
    static ref OPERATOR_KEYS: HashSet<&'static str> = [
        "eq",
        "ne",
        "in",
        "nin",
        "gt",
        "gte",
        "lt",
        "lte",
        "between",
        "like",
        "ilike",
        "nlike",
        "nilike",
        "regex",
        "iregex",
        "nregex",
        "niregex",
        "contains",
        "overlaps",
        "containedBy",
        "pathExists",
        "pathIsTrue",
    ]
    .into_iter()
    .collect();
}

pub fn is_operator_key(key: &str) -> bool {
    OPERATOR_KEYS.contains(key)
}

fn type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn expect_object<'a>(value: &'a Json, context: &str) -> Result<&'a Map<String, Json>, FilterError> {
    value.as_object().ok_or_else(|| FilterError::ExpectedObject {
        context: context.to_string(),
        actual: type_name(value).to_string(),
    })
}

/// Parse an entity filter such as `{ "firstName": "a1", "books": { ... } }`.
pub fn entity_filter_from_json(value: &Json) -> Result<EntityFilter, FilterError> {
    let object = expect_object(value, "entity filter")?;
    let mut filter = EntityFilter::new();
    for (key, value) in object {
        if key == ALIAS_KEY {
            filter.alias = Some(alias_name(value)?);
            continue;
        }
        filter.fields.push((key.clone(), filter_value_from_json(value)?));
    }
    Ok(filter)
}

fn alias_name(value: &Json) -> Result<String, FilterError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FilterError::InvalidOperand {
            op: ALIAS_KEY.to_string(),
            expected: "an alias name".to_string(),
        })
}

fn filter_value_from_json(value: &Json) -> Result<FilterValue, FilterError> {
    match value {
        Json::Array(items) => Ok(FilterValue::List(
            items.iter().map(scalar_from_json).collect::<Result<_, _>>()?,
        )),
        Json::Object(object) => {
            if object.len() == 1 {
                if let Some(alias) = object.get(ALIAS_KEY) {
                    return Ok(FilterValue::AliasBinding(alias_name(alias)?));
                }
                if object.contains_key(NEW_ENTITY_KEY) {
                    return Ok(FilterValue::Scalar(scalar_from_json(value)?));
                }
            }
            if !object.is_empty() && object.keys().all(|k| is_operator_key(k)) {
                let ops = object
                    .iter()
                    .map(|(op, operand)| value_filter_from_json(op, operand))
                    .collect::<Result<_, _>>()?;
                return Ok(FilterValue::Ops(ops));
            }
            Ok(FilterValue::SubFilter(entity_filter_from_json(value)?))
        }
        other => Ok(FilterValue::Scalar(scalar_from_json(other)?)),
    }
}

fn scalar_from_json(value: &Json) -> Result<Value, FilterError> {
    if let Some(object) = value.as_object() {
        if let Some(type_name) = object.get(NEW_ENTITY_KEY) {
            return type_name
                .as_str()
                .map(|t| Value::NewEntity(t.to_string()))
                .ok_or_else(|| FilterError::InvalidOperand {
                    op: NEW_ENTITY_KEY.to_string(),
                    expected: "an entity type name".to_string(),
                });
        }
    }
    Ok(Value::from_json(value))
}

fn operand_list(op: &str, operand: &Json) -> Result<Vec<Value>, FilterError> {
    match operand {
        Json::Array(items) => items.iter().map(scalar_from_json).collect(),
        _ => Err(FilterError::InvalidOperand {
            op: op.to_string(),
            expected: "an array".to_string(),
        }),
    }
}

fn operand_string(op: &str, operand: &Json) -> Result<String, FilterError> {
    operand
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FilterError::InvalidOperand {
            op: op.to_string(),
            expected: "a string".to_string(),
        })
}

/// Parse one operator entry, e.g. `"gt": 40`.
pub fn value_filter_from_json(op: &str, operand: &Json) -> Result<ValueFilter, FilterError> {
    let filter = match op {
        "eq" => ValueFilter::Eq(scalar_from_json(operand)?),
        "ne" => ValueFilter::Ne(scalar_from_json(operand)?),
        "gt" => ValueFilter::Gt(scalar_from_json(operand)?),
        "gte" => ValueFilter::Gte(scalar_from_json(operand)?),
        "lt" => ValueFilter::Lt(scalar_from_json(operand)?),
        "lte" => ValueFilter::Lte(scalar_from_json(operand)?),
        "in" => ValueFilter::In(operand_list(op, operand)?),
        "nin" => ValueFilter::Nin(operand_list(op, operand)?),
        "contains" => ValueFilter::Contains(operand_list(op, operand)?),
        "overlaps" => ValueFilter::Overlaps(operand_list(op, operand)?),
        "containedBy" => ValueFilter::ContainedBy(operand_list(op, operand)?),
        "between" => {
            let mut bounds = operand_list(op, operand)?;
            if bounds.len() != 2 {
                return Err(FilterError::InvalidOperand {
                    op: op.to_string(),
                    expected: "an array of two bounds".to_string(),
                });
            }
            let high = bounds.remove(1);
            let low = bounds.remove(0);
            ValueFilter::Between(low, high)
        }
        "like" => ValueFilter::Like(operand_string(op, operand)?),
        "ilike" => ValueFilter::Ilike(operand_string(op, operand)?),
        "nlike" => ValueFilter::Nlike(operand_string(op, operand)?),
        "nilike" => ValueFilter::Nilike(operand_string(op, operand)?),
        "regex" => ValueFilter::Regex(operand_string(op, operand)?),
        "iregex" => ValueFilter::Iregex(operand_string(op, operand)?),
        "nregex" => ValueFilter::Nregex(operand_string(op, operand)?),
        "niregex" => ValueFilter::Niregex(operand_string(op, operand)?),
        "pathExists" => ValueFilter::JsonPathExists(operand_string(op, operand)?),
        "pathIsTrue" => ValueFilter::JsonPathPredicate(operand_string(op, operand)?),
        other => return Err(FilterError::UnknownOperator(other.to_string())),
    };
    Ok(filter.normalize())
}

/// Parse a boolean expression over alias bindings:
///
/// ```json
/// { "or": [ { "alias": "b", "field": "title", "like": "b1%" },
///           { "alias": "a", "field": "age", "gt": 40 },
///           null ],
///   "pruneIfUndefined": "any" }
/// ```
///
/// `null` branches are undefined.
pub fn expression_from_json(value: &Json) -> Result<ExpressionLiteral, FilterError> {
    let object = expect_object(value, "condition expression")?;
    let (op, branches) = match (object.get("and"), object.get("or")) {
        (Some(branches), None) => (BoolOp::And, branches),
        (None, Some(branches)) => (BoolOp::Or, branches),
        _ => {
            return Err(FilterError::InvalidCondition(
                "expected exactly one of `and` / `or`".to_string(),
            ))
        }
    };
    let branches = branches
        .as_array()
        .ok_or_else(|| FilterError::InvalidOperand {
            op: "and/or".to_string(),
            expected: "an array of conditions".to_string(),
        })?
        .iter()
        .map(condition_from_json)
        .collect::<Result<Vec<_>, _>>()?;
    let prune_if_undefined = match object.get("pruneIfUndefined").and_then(Json::as_str) {
        Some("any") => PruneMode::Any,
        Some("never") | None => PruneMode::Never,
        Some(other) => {
            return Err(FilterError::InvalidOperand {
                op: "pruneIfUndefined".to_string(),
                expected: format!("`any` or `never`, got `{other}`"),
            })
        }
    };
    Ok(ExpressionLiteral {
        op,
        branches,
        prune_if_undefined,
    })
}

fn condition_from_json(value: &Json) -> Result<ConditionLiteral, FilterError> {
    if value.is_null() {
        return Ok(ConditionLiteral::Undefined);
    }
    let object = expect_object(value, "condition")?;
    if object.contains_key("and") || object.contains_key("or") {
        return Ok(ConditionLiteral::Nested(expression_from_json(value)?));
    }
    if let Some(sql) = object.get("raw") {
        let sql = operand_string("raw", sql)?;
        let aliases = match object.get("aliases") {
            Some(aliases) => aliases
                .as_array()
                .ok_or_else(|| FilterError::InvalidOperand {
                    op: "aliases".to_string(),
                    expected: "an array of alias names".to_string(),
                })?
                .iter()
                .map(alias_name)
                .collect::<Result<_, _>>()?,
            None => vec![],
        };
        let bindings = match object.get("bindings") {
            Some(bindings) => operand_list("bindings", bindings)?,
            None => vec![],
        };
        return Ok(ConditionLiteral::Raw(RawLiteral {
            aliases,
            sql,
            bindings,
        }));
    }

    let alias = object
        .get("alias")
        .map(alias_name)
        .transpose()?
        .ok_or_else(|| FilterError::InvalidCondition("missing `alias`".to_string()))?;
    let field = object
        .get("field")
        .map(|f| operand_string("field", f))
        .transpose()?
        .ok_or_else(|| FilterError::InvalidCondition("missing `field`".to_string()))?;
    let mut ops = object
        .iter()
        .filter(|(k, _)| k.as_str() != "alias" && k.as_str() != "field");
    match (ops.next(), ops.next()) {
        (Some((op, operand)), None) => Ok(ConditionLiteral::Column(AliasedCondition {
            alias,
            field,
            filter: value_filter_from_json(op, operand)?,
        })),
        _ => Err(FilterError::InvalidCondition(format!(
            "condition on {alias}.{field} must have exactly one operator"
        ))),
    }
}

/// Parse `{ "lastName": "ASC", "publisher": { "name": "DESC" } }`.
pub fn order_by_from_json(value: &Json) -> Result<OrderByLiteral, FilterError> {
    let object = expect_object(value, "order by")?;
    let mut order_by = OrderByLiteral::new();
    for (field, direction) in object {
        let entry = match direction {
            Json::String(s) => OrderByValue::Direction(parse_direction(s)?),
            Json::Object(_) => OrderByValue::Nested(order_by_from_json(direction)?),
            other => return Err(FilterError::InvalidDirection(other.to_string())),
        };
        order_by.0.push((field.clone(), entry));
    }
    Ok(order_by)
}

fn parse_direction(direction: &str) -> Result<SortDirection, FilterError> {
    match direction.to_ascii_uppercase().as_str() {
        "ASC" => Ok(SortDirection::Asc),
        "DESC" => Ok(SortDirection::Desc),
        _ => Err(FilterError::InvalidDirection(direction.to_string())),
    }
}
