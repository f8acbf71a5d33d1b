//! The same filter under every collection-join strategy selects the same
//! authors.

use std::collections::BTreeSet;

use test_case::test_case;

use ormplan::config::PlanConfig;
use ormplan::filter::{
    ConditionLiteral, EntityFilter, ExpressionLiteral, FilterValue, Value, ValueFilter,
};
use ormplan::query_plan::{parse_find_query, FindOptions};
use ormplan::rewrite::JoinStrategy;

use super::library_schema;
use super::memory_db::MemoryDb;

const STRATEGIES: [JoinStrategy; 4] = [
    JoinStrategy::Exists,
    JoinStrategy::Lateral { force: true },
    JoinStrategy::Lateral { force: false },
    JoinStrategy::None,
];

const DELETED: &str = "2024-01-01";

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn library() -> MemoryDb {
    let mut db = MemoryDb::new();
    for id in 1..=5 {
        let deleted_at = if id == 4 { text(DELETED) } else { Value::Null };
        db.insert(
            "authors",
            &[
                ("id", Value::Int(id)),
                ("first_name", text(&format!("a{id}"))),
                ("deleted_at", deleted_at),
            ],
        );
    }
    let books = [
        (10, 1, "b1 one", Value::Null),
        (11, 1, "other", Value::Null),
        (12, 2, "zzz", Value::Null),
        (13, 4, "b1 gone", Value::Null),
        (14, 5, "b1 deleted", text(DELETED)),
    ];
    for (id, author, title, deleted_at) in books {
        db.insert(
            "books",
            &[
                ("id", Value::Int(id)),
                ("author_id", Value::Int(author)),
                ("title", text(title)),
                ("deleted_at", deleted_at),
            ],
        );
    }
    for (id, book, rating) in [(20, 10, 5), (21, 12, 2)] {
        db.insert(
            "book_reviews",
            &[
                ("id", Value::Int(id)),
                ("book_id", Value::Int(book)),
                ("rating", Value::Int(rating)),
            ],
        );
    }
    for (id, author, body) in [(30, 2, "c1"), (32, 1, "c1")] {
        db.insert(
            "comments",
            &[
                ("id", Value::Int(id)),
                ("parent_author_id", Value::Int(author)),
                ("text", text(body)),
            ],
        );
    }
    for (id, book, body) in [(33, 10, "c2"), (34, 11, "c2"), (35, 12, "c2")] {
        db.insert(
            "comments",
            &[
                ("id", Value::Int(id)),
                ("parent_book_id", Value::Int(book)),
                ("text", text(body)),
            ],
        );
    }
    db
}

fn sub(filter: EntityFilter) -> FilterValue {
    FilterValue::SubFilter(filter)
}

fn ops(filter: ValueFilter) -> FilterValue {
    FilterValue::Ops(vec![filter])
}

fn books_like(pattern: &str) -> EntityFilter {
    EntityFilter::new().field(
        "books",
        sub(EntityFilter::new().field("title", ops(ValueFilter::Like(pattern.to_string())))),
    )
}

/// Author ids selected under each strategy, in `STRATEGIES` order
fn ids_per_strategy(filter: &EntityFilter, conditions: Option<ExpressionLiteral>) -> Vec<BTreeSet<i64>> {
    let schema = library_schema();
    let db = library();
    STRATEGIES
        .iter()
        .map(|strategy| {
            let options = FindOptions {
                strategy: Some(*strategy),
                conditions: conditions.clone(),
                ..Default::default()
            };
            let plan = parse_find_query(&schema, &PlanConfig::default(), "Author", filter, &options)
                .unwrap_or_else(|e| panic!("planning under {strategy} failed: {e}"));
            db.primary_ids(&plan)
        })
        .collect()
}

fn assert_all_select(filter: &EntityFilter, conditions: Option<ExpressionLiteral>, expected: &[i64]) {
    let expected: BTreeSet<i64> = expected.iter().copied().collect();
    for (strategy, ids) in STRATEGIES.iter().zip(ids_per_strategy(filter, conditions)) {
        assert_eq!(ids, expected, "strategy {strategy}");
    }
}

#[test]
fn test_no_filter_skips_soft_deleted() {
    assert_all_select(&EntityFilter::new(), None, &[1, 2, 3, 5]);
}

#[test_case("b1%", &[1] ; "prefix skips deleted books and authors")]
#[test_case("%o%", &[1] ; "infix")]
#[test_case("zz_", &[2] ; "single char wildcard")]
#[test_case("nothing%", &[] ; "no match")]
fn test_collection_like(pattern: &str, expected: &[i64]) {
    assert_all_select(&books_like(pattern), None, expected);
}

#[test]
fn test_nested_collection() {
    let filter = EntityFilter::new().field(
        "books",
        sub(EntityFilter::new().field(
            "reviews",
            sub(EntityFilter::new().field("rating", ops(ValueFilter::Gte(Value::Int(3))))),
        )),
    );
    assert_all_select(&filter, None, &[1]);
}

#[test]
fn test_nested_sibling_collections() {
    let filter = EntityFilter::new().field(
        "books",
        sub(EntityFilter::new()
            .field(
                "reviews",
                sub(EntityFilter::new().field("rating", ops(ValueFilter::Gte(Value::Int(3))))),
            )
            .field("comments", sub(EntityFilter::new().field("text", FilterValue::Scalar(text("c2")))))),
    );
    assert_all_select(&filter, None, &[1]);
}

#[test]
fn test_sibling_collections() {
    let filter = books_like("b1%").field(
        "comments",
        sub(EntityFilter::new().field("text", FilterValue::Scalar(text("c1")))),
    );
    assert_all_select(&filter, None, &[1]);
}

#[test]
fn test_or_across_parent_and_collection() {
    let filter = EntityFilter::new()
        .with_alias("a")
        .field("books", FilterValue::AliasBinding("b".to_string()));
    let conditions = ExpressionLiteral::or(vec![
        ConditionLiteral::column("a", "first_name", ValueFilter::Eq(text("a3"))),
        ConditionLiteral::column("b", "title", ValueFilter::Like("zz%".to_string())),
    ]);
    assert_all_select(&filter, Some(conditions), &[2, 3]);
}

#[test]
fn test_missing_collection() {
    let filter = EntityFilter::new().field("books", FilterValue::Scalar(Value::Null));
    assert_all_select(&filter, None, &[3]);
}

#[test]
fn test_collection_and_parent_column() {
    let filter = books_like("%").field("first_name", FilterValue::List(vec![text("a2"), text("a3")]));
    assert_all_select(&filter, None, &[2]);
}
