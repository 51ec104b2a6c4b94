//! Relation descriptors.
//!
//! A `RelationDef` is what the relation registry hands out for one named
//! relation of an entity type. The join tree never mutates a registry
//! descriptor: every node owns a clone with scopes and per-call options
//! merged in.

use crate::query::criteria::Criteria;
use crate::relation::spec::{RelationOptions, RelationSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;

static LIST_SEPARATOR: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s*,\s*").ok());
static JUNCTION_SPEC: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(.*?)\s*\((.*)\)\s*$").ok());

/// Split a comma separated list, dropping empty entries
pub(crate) fn split_list(list: &str) -> Vec<String> {
    let trimmed = list.trim();
    match LIST_SEPARATOR.as_ref() {
        Some(re) => re
            .split(trimmed)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => trimmed
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Type of relationship between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Many-to-one; the foreign key lives in the owning entity's table
    BelongsTo,
    /// One-to-one; the foreign key lives in the related table
    HasOne,
    /// One-to-many; the foreign key lives in the related table
    HasMany,
    /// Many-to-many through a junction table
    ManyToMany,
    /// Aggregate over related rows (COUNT by default)
    Stat,
}

impl RelationKind {
    /// Singular relations never multiply parent rows when joined
    pub fn is_singular(self) -> bool {
        matches!(self, Self::BelongsTo | Self::HasOne)
    }

    pub fn is_plural(self) -> bool {
        matches!(self, Self::HasMany | Self::ManyToMany)
    }

    pub fn is_stat(self) -> bool {
        matches!(self, Self::Stat)
    }
}

/// Foreign key specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    /// Ordered foreign key columns, paired with primary key columns through
    /// declared constraints or by position
    Columns(Vec<String>),
    /// Explicit `(foreign key column, primary key column)` pairs
    Mapping(Vec<(String, String)>),
}

impl ForeignKey {
    /// Parse `"order_id"` or `"order_id, line_no"`
    pub fn parse(list: &str) -> Self {
        Self::Columns(split_list(list))
    }

    pub fn mapping(pairs: &[(&str, &str)]) -> Self {
        Self::Mapping(
            pairs
                .iter()
                .map(|(fk, pk)| ((*fk).to_string(), (*pk).to_string()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Columns(c) => c.len(),
            Self::Mapping(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Junction table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    /// Junction columns referencing the parent and the related table
    pub columns: Vec<String>,
}

impl Junction {
    pub fn new(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Parse `"order_tags(order_id, tag_id)"`; `None` when malformed
    pub fn parse(spec: &str) -> Option<Self> {
        let caps = JUNCTION_SPEC.as_ref()?.captures(spec)?;
        let table = caps.get(1)?.as_str().trim();
        if table.is_empty() {
            return None;
        }
        Some(Self {
            table: table.to_string(),
            columns: split_list(caps.get(2)?.as_str()),
        })
    }
}

/// SQL join operator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    LeftOuter,
    Inner,
    /// Verbatim operator such as `RIGHT JOIN`
    Custom(String),
}

impl JoinType {
    pub fn as_sql(&self) -> &str {
        match self {
            Self::LeftOuter => "LEFT OUTER JOIN",
            Self::Inner => "INNER JOIN",
            Self::Custom(s) => s.as_str(),
        }
    }
}

/// Projection of a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    /// Every column of the table
    #[default]
    All,
    /// Column names, `*`, or `<expr> AS <alias>` entries
    Columns(Vec<String>),
    /// Nothing selected; the node still contributes its join, for
    /// filtering and through chains
    None,
}

impl Selection {
    /// Parse a comma separated select list; empty means nothing is selected
    pub fn parse(list: &str) -> Self {
        let trimmed = list.trim();
        if trimmed == "*" {
            return Self::All;
        }
        let items = split_list(trimmed);
        if items.is_empty() {
            Self::None
        } else {
            Self::Columns(items)
        }
    }

    pub fn columns(items: &[&str]) -> Self {
        Self::Columns(items.iter().map(|s| (*s).to_string()).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Columns(c) => c.is_empty(),
            Self::None => true,
        }
    }

    /// Merge another selection in: `*` yields to the other side, explicit
    /// lists are unioned in order
    pub fn merge(&mut self, other: &Selection) {
        if self == other || matches!(other, Selection::All) {
            return;
        }
        if matches!(self, Selection::All) {
            *self = other.clone();
            return;
        }
        let mut items = match std::mem::take(self) {
            Selection::Columns(c) => c,
            _ => Vec::new(),
        };
        if let Selection::Columns(more) = other {
            for item in more {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
        }
        *self = if items.is_empty() {
            Selection::None
        } else {
            Selection::Columns(items)
        };
    }
}

/// A named relation of an entity type
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDef {
    /// Relation name, unique within the owning entity type
    pub name: String,
    pub kind: RelationKind,
    /// Related entity type
    pub entity: String,
    pub foreign_key: ForeignKey,
    /// Junction table (`ManyToMany` only); `None` when the declaration is malformed
    pub junction: Option<Junction>,
    /// Intermediate relation of the owning entity this relation is reached through
    pub through: Option<String>,
    pub alias: Option<String>,
    pub join_type: JoinType,
    pub select: Selection,
    pub condition: String,
    /// Extra join condition, ANDed into the ON clause
    pub on: String,
    pub join: String,
    pub group: String,
    pub having: String,
    pub order: String,
    pub params: Vec<(String, Value)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Attribute whose value keys the related collection
    pub index: Option<String>,
    /// `Some(true)` forces a join, `Some(false)` forces a separate statement
    pub together: Option<bool>,
    /// Named scopes of the related entity applied to this relation
    pub scopes: Vec<String>,
    /// Nested relations always loaded with this one
    pub with: Vec<RelationSpec>,
    /// Aggregate expression of a Stat relation
    pub stat_select: String,
    /// Value of a Stat relation for records without related rows
    pub stat_default: Value,
}

impl RelationDef {
    fn new(name: &str, kind: RelationKind, entity: &str, foreign_key: ForeignKey) -> Self {
        Self {
            name: name.to_string(),
            kind,
            entity: entity.to_string(),
            foreign_key,
            junction: None,
            through: None,
            alias: None,
            join_type: JoinType::LeftOuter,
            select: Selection::All,
            condition: String::new(),
            on: String::new(),
            join: String::new(),
            group: String::new(),
            having: String::new(),
            order: String::new(),
            params: Vec::new(),
            limit: None,
            offset: None,
            index: None,
            together: None,
            scopes: Vec::new(),
            with: Vec::new(),
            stat_select: "COUNT(*)".to_string(),
            stat_default: Value::Int(Some(0)),
        }
    }

    pub fn belongs_to(name: &str, entity: &str, foreign_key: &str) -> Self {
        Self::new(name, RelationKind::BelongsTo, entity, ForeignKey::parse(foreign_key))
    }

    pub fn has_one(name: &str, entity: &str, foreign_key: &str) -> Self {
        Self::new(name, RelationKind::HasOne, entity, ForeignKey::parse(foreign_key))
    }

    pub fn has_many(name: &str, entity: &str, foreign_key: &str) -> Self {
        Self::new(name, RelationKind::HasMany, entity, ForeignKey::parse(foreign_key))
    }

    /// Many-to-many through `junction`, written as `"table(fk1, fk2)"`
    pub fn many_many(name: &str, entity: &str, junction: &str) -> Self {
        let mut def = Self::new(
            name,
            RelationKind::ManyToMany,
            entity,
            ForeignKey::Columns(Vec::new()),
        );
        def.junction = Junction::parse(junction);
        if let Some(j) = &def.junction {
            def.foreign_key = ForeignKey::Columns(j.columns.clone());
        }
        def
    }

    pub fn stat(name: &str, entity: &str, foreign_key: &str) -> Self {
        Self::new(name, RelationKind::Stat, entity, ForeignKey::parse(foreign_key))
    }

    pub fn foreign_key_mapping(mut self, pairs: &[(&str, &str)]) -> Self {
        self.foreign_key = ForeignKey::mapping(pairs);
        self
    }

    pub fn through(mut self, relation: &str) -> Self {
        self.through = Some(relation.to_string());
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn select(mut self, select: Selection) -> Self {
        self.select = select;
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.condition = condition.to_string();
        self
    }

    pub fn on(mut self, on: &str) -> Self {
        self.on = on.to_string();
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

    pub fn stat_select(mut self, select: &str) -> Self {
        self.stat_select = select.to_string();
        self
    }

    pub fn stat_default<V: Into<Value>>(mut self, value: V) -> Self {
        self.stat_default = value.into();
        self
    }

    /// Merge a named scope of the related entity.
    ///
    /// A scope condition restricts the join itself, so it goes into `on`
    /// for joined relations. Stat relations keep their own select.
    pub fn merge_criteria(&mut self, criteria: &Criteria) {
        if self.kind.is_stat() {
            and_into(&mut self.condition, &criteria.condition);
        } else {
            self.select.merge(&criteria.select);
            and_into(&mut self.on, &criteria.condition);
        }
        self.merge_fragments(
            &criteria.order,
            &criteria.group,
            &criteria.join,
            &criteria.having,
            &criteria.params,
        );
        if criteria.limit.is_some() {
            self.limit = criteria.limit;
        }
        if criteria.offset.is_some() {
            self.offset = criteria.offset;
        }
    }

    /// Merge per-call options given in a nested relation specification
    pub fn merge_options(&mut self, options: &RelationOptions) {
        if let Some(select) = &options.select {
            if self.kind.is_stat() {
                if let Selection::Columns(items) = select {
                    self.stat_select = items.join(", ");
                }
            } else {
                self.select.merge(select);
            }
        }
        if let Some(condition) = &options.condition {
            and_into(&mut self.condition, condition);
        }
        if let Some(on) = &options.on {
            and_into(&mut self.on, on);
        }
        self.merge_fragments(
            options.order.as_deref().unwrap_or_default(),
            options.group.as_deref().unwrap_or_default(),
            options.join.as_deref().unwrap_or_default(),
            options.having.as_deref().unwrap_or_default(),
            &options.params,
        );
        if let Some(alias) = &options.alias {
            self.alias = Some(alias.clone());
        }
        if let Some(join_type) = &options.join_type {
            self.join_type = join_type.clone();
        }
        if options.limit.is_some() {
            self.limit = options.limit;
        }
        if options.offset.is_some() {
            self.offset = options.offset;
        }
        if options.index.is_some() {
            self.index = options.index.clone();
        }
        if options.together.is_some() {
            self.together = options.together;
        }
        self.with.extend(options.with.iter().cloned());
    }

    fn merge_fragments(
        &mut self,
        order: &str,
        group: &str,
        join: &str,
        having: &str,
        params: &[(String, Value)],
    ) {
        if !order.is_empty() && self.order != order {
            self.order = if self.order.is_empty() {
                order.to_string()
            } else {
                format!("{order}, {}", self.order)
            };
        }
        if !group.is_empty() && self.group != group {
            self.group = if self.group.is_empty() {
                group.to_string()
            } else {
                format!("{}, {group}", self.group)
            };
        }
        if !join.is_empty() && self.join != join {
            self.join = if self.join.is_empty() {
                join.to_string()
            } else {
                format!("{} {join}", self.join)
            };
        }
        and_into(&mut self.having, having);
        for (name, value) in params {
            match self.params.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.clone(),
                None => self.params.push((name.clone(), value.clone())),
            }
        }
    }
}

/// `target = (target) AND (extra)`, skipping empty and identical fragments
pub(crate) fn and_into(target: &mut String, extra: &str) {
    if extra.is_empty() || target == extra {
        return;
    }
    *target = if target.is_empty() {
        extra.to_string()
    } else {
        format!("({target}) AND ({extra})")
    };
}
