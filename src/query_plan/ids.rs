//! Tagged id handling.
//!
//! Ids arrive either raw (`1`) or tagged with the entity's tag (`"a:1"`).
//! Untagged-string entities keep their ids verbatim.

use crate::config::NilIdSentinels;
use crate::filter::{Value, ValueFilter};
use crate::metadata::{EntityMetadata, IdType};

use super::errors::PlanError;

/// Split `"a:1"` into `("a", "1")`
pub(super) fn split_tag(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

fn invalid(value: &Value, reason: &str) -> PlanError {
    PlanError::InvalidId {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Convert an id literal into the value stored in `meta`'s id column.
pub(super) fn parse_id(
    value: &Value,
    meta: &EntityMetadata,
    nil: &NilIdSentinels,
) -> Result<Value, PlanError> {
    match (value, meta.id_type) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::NewEntity(_), id_type) => Ok(nil.for_type(id_type)),
        (Value::Int(i), IdType::Int) => Ok(Value::Int(*i)),
        (Value::Int(i), IdType::UntaggedString) => Ok(Value::Text(i.to_string())),
        (Value::Text(s), IdType::UntaggedString) => Ok(Value::Text(s.clone())),
        (Value::Text(s), id_type) => {
            let untagged = match split_tag(s) {
                Some((tag, rest)) if tag == meta.tag => rest,
                Some((tag, _)) => {
                    return Err(invalid(
                        value,
                        &format!("tag `{tag}` does not match {} (`{}`)", meta.type_name, meta.tag),
                    ))
                }
                None => s.as_str(),
            };
            match id_type {
                IdType::Int => untagged
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| invalid(value, &e.to_string())),
                _ => uuid::Uuid::parse_str(untagged)
                    .map(|u| Value::Text(u.to_string()))
                    .map_err(|e| invalid(value, &e.to_string())),
            }
        }
        (_, id_type) => Err(invalid(value, &format!("not a valid {id_type:?} id"))),
    }
}

fn parse_ids(
    values: &[Value],
    meta: &EntityMetadata,
    nil: &NilIdSentinels,
) -> Result<Vec<Value>, PlanError> {
    values.iter().map(|v| parse_id(v, meta, nil)).collect()
}

/// Rewrite a value filter against an id (or foreign key) column so every
/// operand is an untagged id of `meta`.
pub(super) fn id_filter(
    filter: &ValueFilter,
    meta: &EntityMetadata,
    nil: &NilIdSentinels,
    column: &str,
) -> Result<ValueFilter, PlanError> {
    let parsed = match filter {
        ValueFilter::Eq(v) => ValueFilter::Eq(parse_id(v, meta, nil)?),
        ValueFilter::Ne(v) => ValueFilter::Ne(parse_id(v, meta, nil)?),
        ValueFilter::Gt(v) => ValueFilter::Gt(parse_id(v, meta, nil)?),
        ValueFilter::Gte(v) => ValueFilter::Gte(parse_id(v, meta, nil)?),
        ValueFilter::Lt(v) => ValueFilter::Lt(parse_id(v, meta, nil)?),
        ValueFilter::Lte(v) => ValueFilter::Lte(parse_id(v, meta, nil)?),
        ValueFilter::In(values) => ValueFilter::In(parse_ids(values, meta, nil)?),
        ValueFilter::Nin(values) => ValueFilter::Nin(parse_ids(values, meta, nil)?),
        ValueFilter::Between(a, b) => {
            ValueFilter::Between(parse_id(a, meta, nil)?, parse_id(b, meta, nil)?)
        }
        ValueFilter::IsNull => ValueFilter::IsNull,
        ValueFilter::NotNull => ValueFilter::NotNull,
        ValueFilter::Like(_)
        | ValueFilter::Ilike(_)
        | ValueFilter::Nlike(_)
        | ValueFilter::Nilike(_)
        | ValueFilter::Regex(_)
        | ValueFilter::Iregex(_)
        | ValueFilter::Nregex(_)
        | ValueFilter::Niregex(_)
        | ValueFilter::Contains(_)
        | ValueFilter::Overlaps(_)
        | ValueFilter::ContainedBy(_)
        | ValueFilter::JsonPathExists(_)
        | ValueFilter::JsonPathPredicate(_) => {
            return Err(PlanError::UnhandledValueFilter {
                kind: filter.kind().to_string(),
                column: column.to_string(),
            })
        }
    };
    Ok(parsed.normalize())
}
