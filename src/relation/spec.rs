//! Relation specifications: which relations a finder loads.

use crate::relation::def::{JoinType, Selection};
use sea_query::Value;

/// One entry of the relations to load
///
/// ```no_run
/// use active_finder::relation::{RelationOptions, RelationSpec};
///
/// let specs: Vec<RelationSpec> = vec![
///     "items.product".into(),
///     RelationSpec::with_scopes("customer", &["active"]),
///     RelationSpec::nested("tags", RelationOptions::new().together(false)),
/// ];
/// # let _ = specs;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RelationSpec {
    /// Dotted path such as `items.product`, optionally with `:scope` suffixes
    Path(String),
    /// Dotted path plus named scopes applied to its last segment
    PathWithScopes(String, Vec<String>),
    /// Relation name → per-call options, which may nest further relations
    Nested(Vec<(String, RelationOptions)>),
}

impl RelationSpec {
    pub fn path(path: &str) -> Self {
        Self::Path(path.to_string())
    }

    pub fn with_scopes(path: &str, scopes: &[&str]) -> Self {
        Self::PathWithScopes(
            path.to_string(),
            scopes.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    pub fn nested(name: &str, options: RelationOptions) -> Self {
        Self::Nested(vec![(name.to_string(), options)])
    }
}

impl From<&str> for RelationSpec {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for RelationSpec {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

/// Per-call overrides merged into a cloned relation descriptor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationOptions {
    pub alias: Option<String>,
    pub select: Option<Selection>,
    pub condition: Option<String>,
    pub on: Option<String>,
    pub join_type: Option<JoinType>,
    pub join: Option<String>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub order: Option<String>,
    pub params: Vec<(String, Value)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub index: Option<String>,
    pub together: Option<bool>,
    pub scopes: Vec<String>,
    pub with: Vec<RelationSpec>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn select(mut self, select: Selection) -> Self {
        self.select = Some(select);
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn on(mut self, on: &str) -> Self {
        self.on = Some(on.to_string());
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn join(mut self, join: &str) -> Self {
        self.join = Some(join.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn having(mut self, having: &str) -> Self {
        self.having = Some(having.to_string());
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order = Some(order.to_string());
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

    pub fn index(mut self, attribute: &str) -> Self {
        self.index = Some(attribute.to_string());
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

    pub fn with<S: Into<RelationSpec>>(mut self, spec: S) -> Self {
        self.with.push(spec.into());
        self
    }
}
