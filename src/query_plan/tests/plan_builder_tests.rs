//! Filters that never touch a collection: columns, to-one relations,
//! inheritance, polymorphic references, ordering and alias bindings.

use test_case::test_case;

use super::{ops, plan, render, scalar, sql, sub};
use crate::filter::{
    ConditionLiteral, EntityFilter, ExpressionLiteral, FilterValue, OrderByLiteral, RawLiteral,
    SortDirection, Value, ValueFilter,
};
use crate::query_plan::{FindOptions, PlanError, SoftDeletes};
use crate::rewrite::JoinStrategy;

#[test]
fn test_primitive_filter_with_soft_delete() {
    let filter = EntityFilter::new().field("first_name", scalar("a1"));
    let rendered = render("Author", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND a.first_name = ? ORDER BY a.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Text("a1".to_string())]);
}

#[test]
fn test_soft_deletes_included() {
    let filter = EntityFilter::new().field("first_name", scalar("a1"));
    let options = FindOptions {
        soft_deletes: SoftDeletes::Include,
        ..Default::default()
    };
    assert_eq!(
        render("Author", &filter, &options).sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.first_name = ? ORDER BY a.id ASC"#
    );
}

#[test]
fn test_same_input_same_plan() {
    let filter = EntityFilter::new()
        .field("publisher", sub(EntityFilter::new().field("name", scalar("p1"))))
        .field(
            "books",
            sub(EntityFilter::new().field("title", ops(vec![ValueFilter::Like("b%".to_string())]))),
        );
    let first = plan("Author", &filter, &FindOptions::default()).unwrap();
    let second = plan("Author", &filter, &FindOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_undefined_fields_are_ignored() {
    let filter = EntityFilter::new()
        .field("first_name", FilterValue::Undefined)
        .field("age", ops(vec![ValueFilter::Gt(Value::Int(40))]));
    assert_eq!(
        sql("Author", &filter),
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND a.age > ? ORDER BY a.id ASC"#
    );
}

#[test]
fn test_in_with_null_is_split() {
    let filter = EntityFilter::new().field(
        "age",
        FilterValue::List(vec![Value::Int(1), Value::Null]),
    );
    let rendered = render("Author", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND (a.age IS NULL OR a.age IN (?)) ORDER BY a.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Int(1)]);
}

#[test_case(scalar("p:1") ; "tagged id")]
#[test_case(sub(EntityFilter::new().field("id", scalar("p:1"))) ; "id-only sub-filter")]
#[test_case(scalar(Value::Int(1)) ; "untagged id")]
fn test_many_to_one_id_uses_foreign_key(value: FilterValue) {
    let filter = EntityFilter::new().field("publisher", value);
    let rendered = render("Author", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a WHERE a.deleted_at IS NULL AND a.publisher_id = ? ORDER BY a.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Int(1)]);
}

#[test]
fn test_unsaved_entity_matches_nil_sentinel() {
    let filter = EntityFilter::new().field(
        "publisher",
        FilterValue::Scalar(Value::NewEntity("Publisher".to_string())),
    );
    let rendered = render("Author", &filter, &FindOptions::default());
    assert!(rendered.sql.contains("a.publisher_id = ?"));
    assert_eq!(rendered.bindings, vec![Value::Int(-1)]);
}

#[test]
fn test_wrong_tag_rejected() {
    let filter = EntityFilter::new().field("mentor", scalar("b:1"));
    let err = plan("Author", &filter, &Default::default()).unwrap_err();
    assert!(matches!(err, PlanError::InvalidId { .. }), "{err:?}");
}

#[test]
fn test_optional_many_to_one_outer_join() {
    let filter =
        EntityFilter::new().field("publisher", sub(EntityFilter::new().field("name", scalar("p1"))));
    assert_eq!(
        sql("Author", &filter),
        r#"SELECT a.* FROM "authors" AS a LEFT OUTER JOIN "publishers" AS p ON a.publisher_id = p.id WHERE a.deleted_at IS NULL AND p.name = ? ORDER BY a.id ASC"#
    );
}

#[test_case(JoinStrategy::Exists ; "exists")]
#[test_case(JoinStrategy::Lateral { force: true } ; "forced lateral")]
#[test_case(JoinStrategy::None ; "none")]
fn test_one_to_one_outer_join_is_not_a_collection(strategy: JoinStrategy) {
    let filter = EntityFilter::new().field("image", sub(EntityFilter::new().field("file_name", scalar(Value::Null))));
    let options = FindOptions {
        strategy: Some(strategy),
        ..Default::default()
    };
    let plan = plan("Author", &filter, &options).unwrap();
    assert!(plan.has_alias("i"));
    assert_eq!(
        crate::sql_generator::to_sql(&plan).unwrap().sql,
        r#"SELECT a.* FROM "authors" AS a LEFT OUTER JOIN "images" AS i ON a.id = i.author_id WHERE a.deleted_at IS NULL AND (i.file_name IS NULL AND i.id IS NOT NULL) ORDER BY a.id ASC"#
    );
}

#[test]
fn test_required_many_to_one_inner_join() {
    let filter =
        EntityFilter::new().field("author", sub(EntityFilter::new().field("first_name", scalar("a1"))));
    assert_eq!(
        sql("Book", &filter),
        r#"SELECT b.* FROM "books" AS b INNER JOIN "authors" AS a ON b.author_id = a.id WHERE b.deleted_at IS NULL AND a.deleted_at IS NULL AND a.first_name = ? ORDER BY b.id ASC"#
    );
}

#[test]
fn test_class_table_root_selects_subtypes() {
    assert_eq!(
        sql("Publisher", &EntityFilter::new()),
        concat!(
            r#"SELECT p.*, p_s0.*, p_s1.*, "#,
            r#"CASE WHEN p_s0.id IS NOT NULL THEN 'LargePublisher' WHEN p_s1.id IS NOT NULL THEN 'SmallPublisher' ELSE 'Publisher' END AS __class "#,
            r#"FROM "publishers" AS p "#,
            r#"LEFT OUTER JOIN "large_publishers" AS p_s0 ON p.id = p_s0.id "#,
            r#"LEFT OUTER JOIN "small_publishers" AS p_s1 ON p.id = p_s1.id "#,
            r#"ORDER BY p.id ASC"#
        )
    );
}

#[test]
fn test_class_table_subtype_filters_base_column() {
    let filter = EntityFilter::new().field("name", scalar("p1"));
    assert_eq!(
        sql("LargePublisher", &filter),
        r#"SELECT lp.*, lp_b0.* FROM "large_publishers" AS lp INNER JOIN "publishers" AS lp_b0 ON lp.id = lp_b0.id WHERE lp_b0.name = ? ORDER BY lp.id ASC"#
    );
}

#[test]
fn test_single_table_subtype_discriminator() {
    let filter = EntityFilter::new().field("duration_in_days", scalar(Value::Int(3)));
    let rendered = render("TaskNew", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT t.* FROM "tasks" AS t WHERE t.type_id = ? AND t.duration_in_days = ? ORDER BY t.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Int(1), Value::Int(3)]);
}

#[test]
fn test_uuid_ids() {
    let id = "6f1d2a3b-4c5d-4e6f-8a7b-9c0d1e2f3a4b";
    let filter = EntityFilter::new().field("id", scalar(format!("task:{id}")));
    let rendered = render("Task", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT t.* FROM "tasks" AS t WHERE t.id = ? ORDER BY t.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Text(id.to_string())]);

    let bad = EntityFilter::new().field("id", scalar("task:nope"));
    assert!(matches!(
        plan("Task", &bad, &FindOptions::default()),
        Err(PlanError::InvalidId { .. })
    ));
}

#[test]
fn test_polymorphic_tagged_id_picks_component() {
    let filter = EntityFilter::new().field("parent", scalar("b:1"));
    let rendered = render("Comment", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT c.* FROM "comments" AS c WHERE c.parent_book_id = ? ORDER BY c.id ASC"#
    );
    assert_eq!(rendered.bindings, vec![Value::Int(1)]);
}

#[test]
fn test_polymorphic_is_null_checks_every_component() {
    let filter = EntityFilter::new().field("parent", scalar(Value::Null));
    assert_eq!(
        sql("Comment", &filter),
        r#"SELECT c.* FROM "comments" AS c WHERE c.parent_book_id IS NULL AND c.parent_author_id IS NULL ORDER BY c.id ASC"#
    );
}

#[test]
fn test_polymorphic_in_groups_by_component() {
    let filter = EntityFilter::new().field(
        "parent",
        FilterValue::List(vec!["b:1".into(), "a:2".into(), "b:3".into()]),
    );
    let rendered = render("Comment", &filter, &FindOptions::default());
    assert_eq!(
        rendered.sql,
        r#"SELECT c.* FROM "comments" AS c WHERE c.parent_book_id IN (?, ?) OR c.parent_author_id IN (?) ORDER BY c.id ASC"#
    );
    assert_eq!(
        rendered.bindings,
        vec![Value::Int(1), Value::Int(3), Value::Int(2)]
    );
}

#[test]
fn test_polymorphic_ne_keeps_nulls() {
    let filter = EntityFilter::new().field("parent", ops(vec![ValueFilter::Ne("a:2".into())]));
    assert_eq!(
        sql("Comment", &filter),
        r#"SELECT c.* FROM "comments" AS c WHERE c.parent_author_id != ? OR c.parent_author_id IS NULL ORDER BY c.id ASC"#
    );
}

#[test]
fn test_polymorphic_errors() {
    let join = EntityFilter::new().field("parent", sub(EntityFilter::new().field("title", scalar("b1"))));
    assert_eq!(
        plan("Comment", &join, &FindOptions::default()).unwrap_err(),
        PlanError::JoinThroughPolymorphic {
            entity: "Comment".to_string(),
            field: "parent".to_string()
        }
    );

    let unknown_tag = EntityFilter::new().field("parent", scalar("t:1"));
    assert!(matches!(
        plan("Comment", &unknown_tag, &FindOptions::default()),
        Err(PlanError::InvalidId { .. })
    ));

    let like = EntityFilter::new().field("parent", ops(vec![ValueFilter::Like("b%".to_string())]));
    assert!(matches!(
        plan("Comment", &like, &FindOptions::default()),
        Err(PlanError::UnhandledValueFilter { .. })
    ));
}

#[test]
fn test_unknown_field() {
    let filter = EntityFilter::new().field("nope", scalar(Value::Int(1)));
    assert_eq!(
        plan("Author", &filter, &FindOptions::default()).unwrap_err(),
        PlanError::UnknownField {
            entity: "Author".to_string(),
            field: "nope".to_string()
        }
    );
}

#[test]
fn test_explicit_ordering_then_ids() {
    let options = FindOptions {
        order_by: OrderByLiteral::new().by("last_name", SortDirection::Desc),
        ..Default::default()
    };
    assert!(render("Author", &EntityFilter::new(), &options)
        .sql
        .ends_with("ORDER BY a.last_name DESC, a.id ASC"));
}

#[test]
fn test_alias_bound_conditions() {
    let filter = EntityFilter::new()
        .with_alias("a")
        .field("publisher", FilterValue::AliasBinding("p".to_string()));
    let options = FindOptions {
        conditions: Some(ExpressionLiteral::and(vec![
            ConditionLiteral::column("p", "name", ValueFilter::Eq("p1".into())),
            ConditionLiteral::Raw(RawLiteral {
                aliases: vec!["a".to_string()],
                sql: "{a}.age > ?".to_string(),
                bindings: vec![Value::Int(40)],
            }),
            ConditionLiteral::Undefined,
        ])),
        ..Default::default()
    };
    let rendered = render("Author", &filter, &options);
    assert_eq!(
        rendered.sql,
        r#"SELECT a.* FROM "authors" AS a LEFT OUTER JOIN "publishers" AS p ON a.publisher_id = p.id WHERE a.deleted_at IS NULL AND p.name = ? AND a.age > ? ORDER BY a.id ASC"#
    );
    assert_eq!(
        rendered.bindings,
        vec![Value::Text("p1".to_string()), Value::Int(40)]
    );
}

#[test]
fn test_keep_aliases_survive_pruning() {
    let filter =
        EntityFilter::new().field("publisher", FilterValue::AliasBinding("p".to_string()));
    assert!(!sql("Author", &filter).contains("publishers"));

    let options = FindOptions {
        keep_aliases: vec!["p".to_string()],
        ..Default::default()
    };
    assert_eq!(
        render("Author", &filter, &options).sql,
        r#"SELECT a.* FROM "authors" AS a LEFT OUTER JOIN "publishers" AS p ON a.publisher_id = p.id WHERE a.deleted_at IS NULL ORDER BY a.id ASC"#
    );

    let unknown = FindOptions {
        keep_aliases: vec!["x".to_string()],
        ..Default::default()
    };
    assert_eq!(
        plan("Author", &filter, &unknown).unwrap_err(),
        PlanError::UnknownAliasBinding("x".to_string())
    );
}

#[test]
fn test_pruning_disabled_keeps_unused_joins() {
    let filter =
        EntityFilter::new().field("publisher", FilterValue::AliasBinding("p".to_string()));
    let options = FindOptions {
        prune_joins: Some(false),
        ..Default::default()
    };
    assert!(render("Author", &filter, &options)
        .sql
        .contains(r#"LEFT OUTER JOIN "publishers" AS p"#));
}
