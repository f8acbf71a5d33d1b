use crate::filter::{BoolOp, SortDirection, Value, ValueFilter};
use crate::query_plan::{
    ColumnCondition, Expression, ExpressionFilter, JoinType, QueryPlan, SelectItem, Table,
};

use super::errors::SqlGenError;

/// Convert a plan node to SQL, appending its bindings in placeholder order
pub(super) trait ToSql {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError>;
}

impl ToSql for QueryPlan {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        let mut sql = String::new();

        if let Some(ctes) = self.ctes.as_ref().filter(|c| !c.is_empty()) {
            let parts: Vec<String> = ctes
                .iter()
                .map(|cte| {
                    bindings.extend(cte.bindings.iter().cloned());
                    format!("{} AS ({})", cte.alias, cte.sql)
                })
                .collect();
            sql.push_str(&format!("WITH {} ", parts.join(", ")));
        }

        let selects = if self.selects.is_empty() {
            "*".to_string()
        } else {
            self.selects
                .iter()
                .map(|s| s.to_sql(bindings))
                .collect::<Result<Vec<_>, _>>()?
                .join(", ")
        };
        sql.push_str(&format!("SELECT {selects}"));

        let primary = self.primary().ok_or(SqlGenError::NoPrimaryTable)?;
        sql.push_str(&format!(" FROM \"{}\" AS {}", primary.table, primary.alias));
        for table in &self.tables {
            if matches!(table, Table::Primary(_)) {
                continue;
            }
            sql.push(' ');
            sql.push_str(&table.to_sql(bindings)?);
        }

        if let Some(condition) = self.condition.as_ref().filter(|c| !c.conditions.is_empty()) {
            sql.push_str(&format!(" WHERE {}", condition.to_sql(bindings)?));
        }

        if let Some(group_bys) = self.group_bys.as_ref().filter(|g| !g.is_empty()) {
            let columns: Vec<String> = group_bys
                .iter()
                .map(|g| format!("{}.{}", g.alias, g.column))
                .collect();
            sql.push_str(&format!(" GROUP BY {}", columns.join(", ")));
        }

        if !self.order_bys.is_empty() {
            let columns: Vec<String> = self
                .order_bys
                .iter()
                .map(|o| {
                    let direction = match o.order {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    format!("{}.{} {}", o.alias, o.column, direction)
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", columns.join(", ")));
        }
        Ok(sql)
    }
}

impl ToSql for Table {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        Ok(match self {
            Table::Primary(p) => format!("\"{}\" AS {}", p.table, p.alias),
            Table::Join(j) => {
                let keyword = match j.join_type {
                    JoinType::Inner => "INNER JOIN",
                    JoinType::Outer => "LEFT OUTER JOIN",
                };
                format!(
                    "{keyword} \"{}\" AS {} ON {} = {}",
                    j.table, j.alias, j.col1, j.col2
                )
            }
            Table::Cross(c) => format!("CROSS JOIN \"{}\" AS {}", c.table, c.alias),
            Table::Lateral(l) => {
                format!("CROSS JOIN LATERAL ({}) AS {}", l.query.to_sql(bindings)?, l.alias)
            }
        })
    }
}

fn with_alias(sql: String, col_alias: Option<&String>) -> String {
    match col_alias {
        Some(a) => format!("{sql} AS {a}"),
        None => sql,
    }
}

impl ToSql for SelectItem {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        Ok(match self {
            SelectItem::Star { alias } => format!("{alias}.*"),
            SelectItem::Column { column, col_alias } => {
                with_alias(column.to_string(), col_alias.as_ref())
            }
            SelectItem::Discriminator {
                cases,
                default_type,
                col_alias,
            } => {
                let whens: Vec<String> = cases
                    .iter()
                    .map(|c| format!("WHEN {}.id IS NOT NULL THEN '{}'", c.alias, c.type_name))
                    .collect();
                format!(
                    "CASE {} ELSE '{}' END AS {}",
                    whens.join(" "),
                    default_type,
                    col_alias
                )
            }
            SelectItem::BoolOr {
                condition,
                col_alias,
            } => format!("bool_or({}) AS {}", condition.to_sql(bindings)?, col_alias),
            SelectItem::CountIsZero { col_alias } => format!("count(*) = 0 AS {col_alias}"),
            SelectItem::Raw { sql, col_alias, .. } => with_alias(sql.clone(), col_alias.as_ref()),
        })
    }
}

impl ToSql for ExpressionFilter {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        if self.conditions.is_empty() {
            return Ok(match self.op {
                BoolOp::And => "TRUE".to_string(),
                BoolOp::Or => "FALSE".to_string(),
            });
        }
        let separator = match self.op {
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        };
        let parts = self
            .conditions
            .iter()
            .map(|c| match c {
                Expression::Exp(e) if e.conditions.len() > 1 => {
                    Ok(format!("({})", e.to_sql(bindings)?))
                }
                other => other.to_sql(bindings),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(separator))
    }
}

impl ToSql for Expression {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        match self {
            Expression::Exp(e) => e.to_sql(bindings),
            Expression::Column(c) => c.to_sql(bindings),
            Expression::Raw(r) => {
                bindings.extend(r.bindings.iter().cloned());
                Ok(r.condition.clone())
            }
            Expression::Exists(e) => {
                let keyword = if e.negate { "NOT EXISTS" } else { "EXISTS" };
                Ok(format!("{keyword} ({})", e.query.to_sql(bindings)?))
            }
        }
    }
}

impl ColumnCondition {
    fn placeholder(
        &self,
        column: &str,
        value: &Value,
        bindings: &mut Vec<Value>,
    ) -> Result<&'static str, SqlGenError> {
        if value.is_null() {
            return Err(SqlGenError::NullOperand {
                kind: self.cond.kind().to_string(),
                column: column.to_string(),
            });
        }
        bindings.push(value.clone());
        Ok("?")
    }
}

impl ToSql for ColumnCondition {
    fn to_sql(&self, bindings: &mut Vec<Value>) -> Result<String, SqlGenError> {
        let column = format!("{}.{}", self.alias, self.column);
        let compare =
            |op: &str, value: &Value, bindings: &mut Vec<Value>| -> Result<String, SqlGenError> {
                Ok(format!("{column} {op} {}", self.placeholder(&column, value, bindings)?))
            };
        let text = |s: &String| Value::Text(s.clone());

        match &self.cond {
            ValueFilter::Eq(v) => compare("=", v, bindings),
            ValueFilter::Ne(v) => compare("!=", v, bindings),
            ValueFilter::Gt(v) => compare(">", v, bindings),
            ValueFilter::Gte(v) => compare(">=", v, bindings),
            ValueFilter::Lt(v) => compare("<", v, bindings),
            ValueFilter::Lte(v) => compare("<=", v, bindings),
            ValueFilter::In(values) | ValueFilter::Nin(values) => {
                let negated = matches!(self.cond, ValueFilter::Nin(_));
                if values.is_empty() {
                    return Ok(if negated { "TRUE" } else { "FALSE" }.to_string());
                }
                let placeholders = values
                    .iter()
                    .map(|v| self.placeholder(&column, v, bindings))
                    .collect::<Result<Vec<_>, _>>()?;
                let op = if negated { "NOT IN" } else { "IN" };
                Ok(format!("{column} {op} ({})", placeholders.join(", ")))
            }
            ValueFilter::Between(low, high) => {
                let low = self.placeholder(&column, low, bindings)?;
                let high = self.placeholder(&column, high, bindings)?;
                Ok(format!("{column} BETWEEN {low} AND {high}"))
            }
            ValueFilter::IsNull => Ok(format!("{column} IS NULL")),
            ValueFilter::NotNull => Ok(format!("{column} IS NOT NULL")),
            ValueFilter::Like(p) => compare("LIKE", &text(p), bindings),
            ValueFilter::Ilike(p) => compare("ILIKE", &text(p), bindings),
            ValueFilter::Nlike(p) => compare("NOT LIKE", &text(p), bindings),
            ValueFilter::Nilike(p) => compare("NOT ILIKE", &text(p), bindings),
            ValueFilter::Regex(p) => compare("~", &text(p), bindings),
            ValueFilter::Iregex(p) => compare("~*", &text(p), bindings),
            ValueFilter::Nregex(p) => compare("!~", &text(p), bindings),
            ValueFilter::Niregex(p) => compare("!~*", &text(p), bindings),
            ValueFilter::Contains(values) => compare("@>", &Value::Array(values.clone()), bindings),
            ValueFilter::Overlaps(values) => compare("&&", &Value::Array(values.clone()), bindings),
            ValueFilter::ContainedBy(values) => {
                compare("<@", &Value::Array(values.clone()), bindings)
            }
            ValueFilter::JsonPathExists(path) => compare("@?", &text(path), bindings),
            ValueFilter::JsonPathPredicate(path) => compare("@@", &text(path), bindings),
        }
    }
}
