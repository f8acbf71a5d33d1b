//! Deterministic table alias generation.
//!
//! Aliases are the table name's abbreviation (first letter of each
//! `_`-separated word): `books` → `b`, `book_reviews` → `br`,
//! `authors_to_tags` → `att`. Repeats get an increasing suffix:
//! `b`, `b1`, `b2`, ...
//!
//! One assigner is used per top-level plan, including for every nested
//! subquery, so aliases never collide across scopes.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::QueryPlan;

lazy_static! {
    static ref PLAIN_ALIAS: Regex = Regex::new(r"^(_?[a-z]+)(\d*)$").expect("static regex");
    static ref INHERITANCE_ALIAS: Regex = Regex::new(r"^.+_[bs]\d+$").expect("static regex");
}

#[derive(Debug, Clone, Default)]
pub struct AliasAssigner {
    counters: HashMap<String, usize>,
}

pub fn abbreviation(table_name: &str) -> String {
    table_name
        .split('_')
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_lowercase)
        .collect()
}

impl AliasAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from aliases already present in `plan` (and its
    /// subqueries), including lateral aliases like `_b`. Inheritance aliases
    /// like `p_b0` / `p_s1` derive from their entity alias and are skipped.
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let mut assigner = Self::new();
        for alias in plan.all_table_aliases() {
            if INHERITANCE_ALIAS.is_match(alias) {
                continue;
            }
            if let Some(caps) = PLAIN_ALIAS.captures(alias) {
                let base = caps[1].to_string();
                let next = match caps[2].parse::<usize>() {
                    Ok(n) => n + 1,
                    Err(_) => 1,
                };
                let counter = assigner.counters.entry(base).or_insert(0);
                *counter = (*counter).max(next);
            }
        }
        assigner
    }

    /// Alias for a table, abbreviated from its name
    pub fn next_alias(&mut self, table_name: &str) -> String {
        let abbrev = abbreviation(table_name);
        self.literal_alias(&abbrev)
    }

    /// Alias using `name` as given, suffixed on repeats
    pub fn literal_alias(&mut self, name: &str) -> String {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let alias = if *counter == 0 {
            name.to_string()
        } else {
            format!("{name}{counter}")
        };
        *counter += 1;
        alias
    }
}
