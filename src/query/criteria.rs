//! Root query criteria and named scopes.

use crate::relation::def::{and_into, Selection};
use sea_query::Value;

/// Criteria of the base (root) query.
///
/// Named scopes returned by the relation registry use the same type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub select: Selection,
    pub distinct: bool,
    /// Table alias of the base entity
    pub alias: Option<String>,
    pub condition: String,
    pub join: String,
    pub group: String,
    pub having: String,
    pub order: String,
    pub params: Vec<(String, Value)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `Some(true)` joins every relation into one statement
    pub together: Option<bool>,
    /// Named scopes of the base entity merged in before the query is built
    pub scopes: Vec<String>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: Selection) -> Self {
        self.select = select;
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.condition = condition.to_string();
        self
    }

    /// AND another condition into the existing one
    pub fn add_condition(mut self, condition: &str) -> Self {
        and_into(&mut self.condition, condition);
        self
    }

    pub fn join(mut self, join: &str) -> Self {
        self.join = join.to_string();
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn having(mut self, having: &str) -> Self {
        self.having = having.to_string();
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order = order.to_string();
        self
    }

    pub fn param<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn together(mut self, together: bool) -> Self {
        self.together = Some(together);
        self
    }

    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Whether LIMIT or OFFSET bounds the base rows
    pub fn is_limited(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Merge `other` into these criteria
    pub fn merge(&mut self, other: &Criteria) {
        self.select.merge(&other.select);
        self.distinct |= other.distinct;
        if other.alias.is_some() {
            self.alias = other.alias.clone();
        }
        and_into(&mut self.condition, &other.condition);
        and_into(&mut self.having, &other.having);
        if !other.order.is_empty() && self.order != other.order {
            self.order = if self.order.is_empty() {
                other.order.clone()
            } else {
                format!("{}, {}", other.order, self.order)
            };
        }
        if !other.group.is_empty() && self.group != other.group {
            self.group = if self.group.is_empty() {
                other.group.clone()
            } else {
                format!("{}, {}", self.group, other.group)
            };
        }
        if !other.join.is_empty() && self.join != other.join {
            self.join = if self.join.is_empty() {
                other.join.clone()
            } else {
                format!("{} {}", self.join, other.join)
            };
        }
        for (name, value) in &other.params {
            match self.params.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.clone(),
                None => self.params.push((name.clone(), value.clone())),
            }
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        if other.together.is_some() {
            self.together = other.together;
        }
    }
}
