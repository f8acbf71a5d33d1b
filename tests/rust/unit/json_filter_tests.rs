//! JSON literals compiled end to end

use serde_json::{json, Value as Json};

use ormplan::config::{NilIdSentinels, PlanConfig};
use ormplan::filter::json::{entity_filter_from_json, expression_from_json, order_by_from_json};
use ormplan::filter::{FilterError, Value};
use ormplan::query_plan::{FindOptions, PlanError};
use ormplan::sql_generator::RenderedQuery;
use ormplan::{compile_find_query, CompileError};

use super::library_schema;

fn compile_with(
    config: &PlanConfig,
    filter: Json,
    options: FindOptions,
) -> Result<RenderedQuery, CompileError> {
    let filter = entity_filter_from_json(&filter)?;
    compile_find_query(&library_schema(), config, "Author", &filter, &options)
}

fn compile(filter: Json) -> RenderedQuery {
    compile_with(&PlanConfig::default(), filter, FindOptions::default()).unwrap()
}

#[test]
fn test_columns_and_operators() {
    let rendered = compile(json!({ "first_name": "a1", "age": { "gt": 40 } }));
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND a.first_name = ? AND a.age > ? ORDER BY a.id ASC"#
    );
    assert_eq!(
        rendered.bindings,
        vec![Value::Text("a1".to_string()), Value::Int(40)]
    );
}

#[test]
fn test_collection_filter() {
    let rendered = compile(json!({ "books": { "title": { "like": "b1%" } } }));
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND EXISTS (SELECT 1 FROM "books" AS b WHERE a.id = b.author_id AND b.deleted_at IS NULL AND b.title LIKE ?) ORDER BY a.id ASC"#
    );
}

#[test]
fn test_conditions_over_alias_bindings() {
    let options = FindOptions {
        conditions: Some(
            expression_from_json(&json!({
                "and": [
                    { "alias": "b", "field": "title", "like": "b1%" },
                    { "alias": "a", "field": "age", "gt": 40 }
                ]
            }))
            .unwrap(),
        ),
        ..Default::default()
    };
    let rendered = compile_with(
        &PlanConfig::default(),
        json!({ "as": "a", "books": { "as": "b" } }),
        options,
    )
    .unwrap();
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND a.age > ? AND EXISTS (SELECT 1 FROM "books" AS b WHERE a.id = b.author_id AND b.deleted_at IS NULL AND b.title LIKE ?) ORDER BY a.id ASC"#
    );
    assert_eq!(
        rendered.bindings,
        vec![Value::Int(40), Value::Text("b1%".to_string())]
    );
}

#[test]
fn test_undefined_branch_prunes_expression() {
    let options = FindOptions {
        conditions: Some(
            expression_from_json(&json!({
                "or": [{ "alias": "a", "field": "first_name", "eq": "a1" }, null],
                "pruneIfUndefined": "any"
            }))
            .unwrap(),
        ),
        ..Default::default()
    };
    let rendered = compile_with(&PlanConfig::default(), json!({ "as": "a" }), options).unwrap();
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL ORDER BY a.id ASC"#
    );
    assert!(rendered.bindings.is_empty());
}

#[test]
fn test_order_by_through_many_to_one() {
    let options = FindOptions {
        order_by: order_by_from_json(&json!({ "publisher": { "name": "DESC" } })).unwrap(),
        ..Default::default()
    };
    let rendered = compile_with(&PlanConfig::default(), json!({}), options).unwrap();
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a LEFT OUTER JOIN "publishers" AS p ON a.publisher_id = p.id WHERE a.deleted_at IS NULL ORDER BY p.name DESC, p.id ASC, a.id ASC"#
    );
}

#[test]
fn test_unsaved_entity_uses_configured_sentinel() {
    let filter = json!({ "publisher": { "$new": "Publisher" } });
    assert_eq!(compile(filter.clone()).bindings, vec![Value::Int(-1)]);

    let config = PlanConfig {
        nil_ids: NilIdSentinels {
            int: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let rendered = compile_with(&config, filter, FindOptions::default()).unwrap();
    assert_eq!(rendered.bindings, vec![Value::Int(0)]);
}

#[test]
fn test_operator_object_on_primitive_rejected() {
    let err = compile_with(
        &PlanConfig::default(),
        json!({ "age": { "greater": 1 } }),
        FindOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CompileError::Plan(PlanError::UnsupportedFilterShape {
            entity: "Author".to_string(),
            field: "age".to_string(),
            shape: "sub-filter".to_string(),
        })
    );
}

#[test]
fn test_malformed_literals() {
    assert!(matches!(
        entity_filter_from_json(&json!([1, 2])),
        Err(FilterError::ExpectedObject { .. })
    ));
    assert!(matches!(
        entity_filter_from_json(&json!({ "age": { "between": [1] } })),
        Err(FilterError::InvalidOperand { .. })
    ));
    assert!(matches!(
        expression_from_json(&json!({ "and": [], "or": [] })),
        Err(FilterError::InvalidCondition(_))
    ));
    assert!(matches!(
        order_by_from_json(&json!({ "first_name": "UP" })),
        Err(FilterError::InvalidDirection(_))
    ));
}
