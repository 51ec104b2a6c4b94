//! Statement assembly.
//!
//! `JoinQuery` collects the fragments contributed by every join node visited
//! for one statement and renders them in a fixed clause order.

use crate::query::statement::Statement;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use std::collections::HashSet;

static PLACEHOLDER_CHARS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^:\w+$").ok());

/// Fragments of one SQL statement under construction
#[derive(Debug, Clone, Default)]
pub struct JoinQuery {
    pub selects: Vec<String>,
    pub distinct: bool,
    /// FROM table followed by JOIN clauses, root to leaf
    pub joins: Vec<String>,
    pub conditions: Vec<String>,
    pub orders: Vec<String>,
    pub groups: Vec<String>,
    pub havings: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub params: Vec<(String, Value)>,
    /// Join nodes whose columns this statement returns
    pub elements: HashSet<usize>,
}

fn push_fragment(list: &mut Vec<String>, fragment: &str) {
    let fragment = fragment.trim();
    if !fragment.is_empty() {
        list.push(fragment.to_string());
    }
}

/// Placeholder names carry their leading colon
pub(crate) fn placeholder(name: &str) -> String {
    if name.starts_with(':') {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

impl JoinQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_select(&mut self, select: &str) {
        push_fragment(&mut self.selects, select);
    }

    pub fn add_join(&mut self, join: &str) {
        push_fragment(&mut self.joins, join);
    }

    pub fn add_condition(&mut self, condition: &str) {
        push_fragment(&mut self.conditions, condition);
    }

    pub fn add_order(&mut self, order: &str) {
        push_fragment(&mut self.orders, order);
    }

    pub fn add_group(&mut self, group: &str) {
        push_fragment(&mut self.groups, group);
    }

    pub fn add_having(&mut self, having: &str) {
        push_fragment(&mut self.havings, having);
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Bind the parameters of one node and return its fragments with any
    /// renamed placeholders rewritten.
    ///
    /// A name already bound to an equal value is shared. A name bound to a
    /// different value is renamed with a numeric suffix (`:status_1`) in
    /// every fragment passed in.
    pub fn bind(&mut self, params: &[(String, Value)], fragments: Vec<String>) -> Vec<String> {
        let mut fragments = fragments;
        for (name, value) in params {
            let name = placeholder(name);
            match self.param(&name) {
                None => self.params.push((name, value.clone())),
                Some(existing) if existing == value => {}
                Some(_) => {
                    let mut n = 1;
                    let renamed = loop {
                        let candidate = format!("{name}_{n}");
                        match self.param(&candidate) {
                            None => break candidate,
                            Some(existing) if existing == value => break candidate,
                            Some(_) => n += 1,
                        }
                    };
                    log::trace!("renaming colliding parameter {name} to {renamed}");
                    fragments = fragments
                        .into_iter()
                        .map(|f| rename_placeholder(&f, &name, &renamed))
                        .collect();
                    if self.param(&renamed).is_none() {
                        self.params.push((renamed, value.clone()));
                    }
                }
            }
        }
        fragments
    }

    /// Render the statement
    pub fn build(&self) -> Statement {
        let mut sql = String::from(if self.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        sql.push_str(&self.selects.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&self.joins.join(" "));
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE (");
            sql.push_str(&self.conditions.join(") AND ("));
            sql.push(')');
        }
        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }
        if !self.havings.is_empty() {
            sql.push_str(" HAVING (");
            sql.push_str(&self.havings.join(") AND ("));
            sql.push(')');
        }
        if !self.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.orders.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        Statement::new(sql, self.params.clone())
    }
}

/// Replace whole-word occurrences of placeholder `from` with `to`
fn rename_placeholder(fragment: &str, from: &str, to: &str) -> String {
    let valid = PLACEHOLDER_CHARS
        .as_ref()
        .is_some_and(|re| re.is_match(from));
    if !valid {
        return fragment.to_string();
    }
    match Regex::new(&format!(r"{}\b", regex::escape(from))) {
        Ok(re) => re.replace_all(fragment, to).into_owned(),
        Err(_) => fragment.to_string(),
    }
}
