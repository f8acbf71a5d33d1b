//! Nested-loop evaluator for query plans.
//!
//! Tables are vectors of rows; joins, `EXISTS` and `LATERAL` tables are
//! evaluated with SQL three-valued logic. Predicates the tests never produce
//! (regex, array and JSON operators) panic.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use ormplan::filter::{BoolOp, Value, ValueFilter};
use ormplan::query_plan::{
    ColumnCondition, Expression, ExpressionFilter, JoinType, QueryPlan, RawCondition, SelectItem,
    Table,
};

pub type Row = HashMap<String, Value>;

/// Alias to row; `None` is the all-null side of an unmatched outer join
type Env = HashMap<String, Option<Row>>;

#[derive(Default)]
pub struct MemoryDb {
    tables: HashMap<String, Vec<Row>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, columns: &[(&str, Value)]) {
        let row = columns
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Distinct ids of the primary table's rows selected by `plan`
    pub fn primary_ids(&self, plan: &QueryPlan) -> BTreeSet<i64> {
        let alias = plan.primary_alias().expect("plan has a primary table");
        self.rows(plan, &Env::new())
            .iter()
            .filter_map(|env| match column(env, alias, "id") {
                Value::Int(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn table(&self, name: &str) -> &[Row] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn rows(&self, plan: &QueryPlan, outer: &Env) -> Vec<Env> {
        let mut envs = vec![outer.clone()];
        for table in &plan.tables {
            envs = envs
                .into_iter()
                .flat_map(|env| self.extend(table, env))
                .collect();
        }
        envs.into_iter()
            .filter(|env| match &plan.condition {
                Some(condition) => self.eval_filter(condition, env) == Some(true),
                None => true,
            })
            .collect()
    }

    fn scan(&self, alias: &str, table: &str, env: &Env) -> Vec<Env> {
        self.table(table)
            .iter()
            .map(|row| bind(env, alias, Some(row.clone())))
            .collect()
    }

    fn extend(&self, table: &Table, env: Env) -> Vec<Env> {
        match table {
            Table::Primary(primary) => self.scan(&primary.alias, &primary.table, &env),
            Table::Cross(cross) => self.scan(&cross.alias, &cross.table, &env),
            Table::Join(join) => {
                let parent = column(&env, &join.col1.alias, &join.col1.column);
                let matched: Vec<Env> = self
                    .table(&join.table)
                    .iter()
                    .filter(|row| {
                        let child = row.get(&join.col2.column).unwrap_or(&Value::Null);
                        compare(&parent, child) == Some(Ordering::Equal)
                    })
                    .map(|row| bind(&env, &join.alias, Some(row.clone())))
                    .collect();
                if matched.is_empty() && join.join_type == JoinType::Outer {
                    vec![bind(&env, &join.alias, None)]
                } else {
                    matched
                }
            }
            Table::Lateral(lateral) => {
                let children = self.rows(&lateral.query, &env);
                let mut row = Row::new();
                for select in &lateral.query.selects {
                    match select {
                        SelectItem::BoolOr {
                            condition,
                            col_alias,
                        } => {
                            let values: Vec<bool> = children
                                .iter()
                                .filter_map(|child| self.eval_filter(condition, child))
                                .collect();
                            let value = if values.is_empty() {
                                Value::Null
                            } else {
                                Value::Bool(values.contains(&true))
                            };
                            row.insert(col_alias.clone(), value);
                        }
                        SelectItem::CountIsZero { col_alias } => {
                            row.insert(col_alias.clone(), Value::Bool(children.is_empty()));
                        }
                        other => panic!("unsupported lateral select {other:?}"),
                    }
                }
                vec![bind(&env, &lateral.alias, Some(row))]
            }
        }
    }

    fn eval_filter(&self, filter: &ExpressionFilter, env: &Env) -> Option<bool> {
        let results: Vec<Option<bool>> = filter
            .conditions
            .iter()
            .map(|c| self.eval(c, env))
            .collect();
        let (decisive, neutral) = match filter.op {
            BoolOp::And => (false, true),
            BoolOp::Or => (true, false),
        };
        if results.contains(&Some(decisive)) {
            Some(decisive)
        } else if results.contains(&None) {
            None
        } else {
            Some(neutral)
        }
    }

    fn eval(&self, expression: &Expression, env: &Env) -> Option<bool> {
        match expression {
            Expression::Exp(filter) => self.eval_filter(filter, env),
            Expression::Column(condition) => eval_column(condition, env),
            Expression::Raw(raw) => eval_raw(raw, env),
            Expression::Exists(exists) => {
                let found = !self.rows(&exists.query, env).is_empty();
                Some(found != exists.negate)
            }
        }
    }
}

fn bind(env: &Env, alias: &str, row: Option<Row>) -> Env {
    let mut env = env.clone();
    env.insert(alias.to_string(), row);
    env
}

fn column(env: &Env, alias: &str, column: &str) -> Value {
    match env.get(alias) {
        Some(Some(row)) => row.get(column).cloned().unwrap_or(Value::Null),
        Some(None) => Value::Null,
        None => panic!("alias `{alias}` is not in scope"),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn in_list(value: &Value, list: &[Value]) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    if list
        .iter()
        .any(|item| compare(value, item) == Some(Ordering::Equal))
    {
        Some(true)
    } else if list.iter().any(Value::is_null) {
        None
    } else {
        Some(false)
    }
}

fn like(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like(&text[i..], rest)),
        Some(('_', rest)) => !text.is_empty() && like(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like(&text[1..], rest),
    }
}

fn like_text(value: &Value, pattern: &str, ignore_case: bool) -> Option<bool> {
    let Value::Text(text) = value else {
        return None;
    };
    let (text, pattern) = if ignore_case {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.clone(), pattern.to_string())
    };
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    Some(like(&text, &pattern))
}

fn eval_column(condition: &ColumnCondition, env: &Env) -> Option<bool> {
    let value = column(env, &condition.alias, &condition.column);
    match &condition.cond {
        ValueFilter::IsNull => Some(value.is_null()),
        ValueFilter::NotNull => Some(!value.is_null()),
        ValueFilter::Eq(v) => compare(&value, v).map(|o| o == Ordering::Equal),
        ValueFilter::Ne(v) => compare(&value, v).map(|o| o != Ordering::Equal),
        ValueFilter::Gt(v) => compare(&value, v).map(|o| o == Ordering::Greater),
        ValueFilter::Gte(v) => compare(&value, v).map(|o| o != Ordering::Less),
        ValueFilter::Lt(v) => compare(&value, v).map(|o| o == Ordering::Less),
        ValueFilter::Lte(v) => compare(&value, v).map(|o| o != Ordering::Greater),
        ValueFilter::In(list) => in_list(&value, list),
        ValueFilter::Nin(list) => in_list(&value, list).map(|found| !found),
        ValueFilter::Between(low, high) => {
            let above = compare(&value, low)? != Ordering::Less;
            let below = compare(&value, high)? != Ordering::Greater;
            Some(above && below)
        }
        ValueFilter::Like(p) => like_text(&value, p, false),
        ValueFilter::Ilike(p) => like_text(&value, p, true),
        ValueFilter::Nlike(p) => like_text(&value, p, false).map(|m| !m),
        ValueFilter::Nilike(p) => like_text(&value, p, true).map(|m| !m),
        other => panic!("unsupported predicate `{}`", other.kind()),
    }
}

fn column_ref<'a>(text: &'a str, raw: &RawCondition) -> (&'a str, &'a str) {
    text.trim()
        .split_once('.')
        .unwrap_or_else(|| panic!("unsupported raw condition `{}`", raw.condition))
}

/// Only the two shapes the rewrites emit: `x.y = z.w` and a boolean `x.y`
fn eval_raw(raw: &RawCondition, env: &Env) -> Option<bool> {
    assert!(raw.bindings.is_empty(), "bound raw conditions are unsupported");
    match raw.condition.split_once(" = ") {
        Some((left, right)) => {
            let (la, lc) = column_ref(left, raw);
            let (ra, rc) = column_ref(right, raw);
            compare(&column(env, la, lc), &column(env, ra, rc)).map(|o| o == Ordering::Equal)
        }
        None => {
            let (alias, name) = column_ref(&raw.condition, raw);
            match column(env, alias, name) {
                Value::Bool(b) => Some(b),
                Value::Null => None,
                other => panic!("non-boolean raw condition value {other}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns() {
        let check = |text: &str, pattern: &str| like_text(&text.into(), pattern, false);
        assert_eq!(check("b1 one", "b1%"), Some(true));
        assert_eq!(check("b1 one", "b_ one"), Some(true));
        assert_eq!(check("other", "b1%"), Some(false));
        assert_eq!(like_text(&Value::Null, "%", false), None);
        assert_eq!(like_text(&"ABC".into(), "a%", true), Some(true));
    }

    #[test]
    fn test_in_list_with_null_is_unknown() {
        let list = vec![Value::Int(1), Value::Null];
        assert_eq!(in_list(&Value::Int(1), &list), Some(true));
        assert_eq!(in_list(&Value::Int(2), &list), None);
        assert_eq!(in_list(&Value::Null, &list), None);
    }
}
