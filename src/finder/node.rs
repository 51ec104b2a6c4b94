//! Join nodes: column aliasing, projections and the per-node record cache.

use crate::error::FinderError;
use crate::record::{Record, RecordRef};
use crate::relation::def::{RelationDef, RelationKind, Selection};
use crate::relation::identity::KeyValue;
use crate::schema::{quote_column_name, quote_table_name, EntityType, TableSchema};
use crate::value::Row;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_query::Value;
use std::collections::{HashMap, HashSet};

/// Index of a node in its tree
pub type NodeId = usize;

/// The base entity's node
pub const ROOT: NodeId = 0;

static ALIASED_EXPRESSION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)^(.*?)\s+AS\s+(\w+)$").ok());

/// Records materialized for one node, keyed by serialized primary key
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: Vec<(KeyValue, RecordRef)>,
    by_key: HashMap<String, usize>,
}

impl RecordCache {
    pub fn get(&self, cache_key: &str) -> Option<&RecordRef> {
        self.by_key.get(cache_key).map(|&i| &self.entries[i].1)
    }

    /// Insert unless the key is already cached; returns the cached record
    pub fn insert(&mut self, key: KeyValue, record: RecordRef) -> RecordRef {
        let cache_key = key.cache_key();
        if let Some(existing) = self.get(&cache_key) {
            return existing.clone();
        }
        self.by_key.insert(cache_key, self.entries.len());
        self.entries.push((key, record.clone()));
        record
    }

    /// Records in first-seen order
    pub fn records(&self) -> Vec<RecordRef> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn entries(&self) -> &[(KeyValue, RecordRef)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_key.clear();
    }
}

/// One node of a join tree
#[derive(Debug)]
pub struct JoinNode<'a> {
    pub(crate) id: NodeId,
    pub(crate) entity: &'a EntityType,
    pub(crate) table: &'a TableSchema,
    /// `None` only for the root
    pub(crate) relation: Option<RelationDef>,
    /// Junction table of a many-to-many relation
    pub(crate) junction_table: Option<&'a TableSchema>,
    pub(crate) table_alias: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) stats: Vec<NodeId>,
    /// Intermediate node this node is reached through
    pub(crate) slave: Option<NodeId>,
    /// Node reached through this one
    pub(crate) master: Option<NodeId>,
    pub(crate) joined: bool,
    /// column → select alias, table columns first, then aliased expressions
    column_aliases: Vec<(String, String)>,
    pub(crate) records: RecordCache,
    /// (record key, relation name, related key) pairs already attached
    pub(crate) attached: HashSet<(String, String, String)>,
}

impl<'a> JoinNode<'a> {
    pub(crate) fn new(
        id: NodeId,
        entity: &'a EntityType,
        table: &'a TableSchema,
        relation: Option<RelationDef>,
        table_alias: String,
        parent: Option<NodeId>,
        alias_prefix: &str,
    ) -> Self {
        // case-folding databases get an upper case alias throughout
        let separator = if alias_prefix.chars().any(char::is_lowercase) || alias_prefix.is_empty() {
            "c"
        } else {
            "C"
        };
        let column_aliases = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), format!("{alias_prefix}{id}_{separator}{idx}")))
            .collect();

        Self {
            id,
            entity,
            table,
            relation,
            junction_table: None,
            table_alias,
            parent,
            children: Vec::new(),
            stats: Vec::new(),
            slave: None,
            master: None,
            joined: false,
            column_aliases,
            records: RecordCache::default(),
            attached: HashSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn entity(&self) -> &EntityType {
        self.entity
    }

    pub fn table(&self) -> &TableSchema {
        self.table
    }

    pub fn relation(&self) -> Option<&RelationDef> {
        self.relation.as_ref()
    }

    pub fn kind(&self) -> Option<RelationKind> {
        self.relation.as_ref().map(|r| r.kind)
    }

    /// Relation name, or the entity name for the root
    pub fn name(&self) -> &str {
        match &self.relation {
            Some(r) => &r.name,
            None => &self.entity.name,
        }
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn stats(&self) -> &[NodeId] {
        &self.stats
    }

    pub fn slave(&self) -> Option<NodeId> {
        self.slave
    }

    pub fn master(&self) -> Option<NodeId> {
        self.master
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_stat(&self) -> bool {
        self.kind().is_some_and(RelationKind::is_stat)
    }

    /// Projection of the relation; the root's projection comes from the criteria
    pub fn selection(&self) -> Selection {
        self.relation
            .as_ref()
            .map_or(Selection::All, |r| r.select.clone())
    }

    pub fn column_alias(&self, column: &str) -> Option<&str> {
        self.column_aliases
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, a)| a.as_str())
    }

    pub fn column_aliases(&self) -> &[(String, String)] {
        &self.column_aliases
    }

    /// Records materialized so far, in first-seen order
    pub fn records(&self) -> Vec<RecordRef> {
        self.records.records()
    }

    pub fn raw_table_alias(&self) -> String {
        quote_table_name(&self.table_alias)
    }

    /// Quoted table alias followed by `.`
    pub fn column_prefix(&self) -> String {
        format!("{}.", self.raw_table_alias())
    }

    pub fn table_with_alias(&self) -> String {
        format!("{} {}", self.table.raw_name(), self.raw_table_alias())
    }

    fn aliased(&self, column: &str, alias: &str) -> String {
        format!(
            "{}{} AS {}",
            self.column_prefix(),
            quote_column_name(column),
            quote_column_name(alias)
        )
    }

    /// Select list for `select`, registering aliased expressions.
    ///
    /// Primary key columns are appended when the selection leaves them out.
    ///
    /// # Errors
    ///
    /// Returns `FinderError::InvalidColumn` for an entry that is neither a
    /// column of the table nor an `<expr> AS <alias>` expression.
    pub fn column_select(&mut self, select: &Selection) -> Result<String, FinderError> {
        let items = match select {
            Selection::All => {
                return Ok(self
                    .column_aliases
                    .iter()
                    .take(self.table.columns.len())
                    .map(|(c, a)| self.aliased(c, a))
                    .collect::<Vec<_>>()
                    .join(", "));
            }
            Selection::Columns(items) => items.as_slice(),
            Selection::None => &[],
        };

        let mut columns = Vec::new();
        let mut selected: HashSet<String> = HashSet::new();

        for item in items {
            let item = item.trim();
            let key = item.rsplit('.').next().unwrap_or(item);
            let key = key.trim_matches(|c| c == '\'' || c == '"' || c == '`');

            if key == "*" {
                for column in &self.table.columns {
                    if let Some(alias) = self.column_alias(column) {
                        if selected.insert(alias.to_string()) {
                            columns.push(self.aliased(column, alias));
                        }
                    }
                }
                continue;
            }

            if let Some(alias) = self.column_alias(key).map(str::to_string) {
                columns.push(self.aliased(key, &alias));
                selected.insert(alias);
                continue;
            }

            let captures = ALIASED_EXPRESSION
                .as_ref()
                .and_then(|re| re.captures(item));
            match captures.and_then(|c| c.get(2)) {
                Some(alias) => {
                    let alias = alias.as_str().to_string();
                    // registered by an earlier statement of the same finder
                    if self.column_alias(&alias).is_none() {
                        self.column_aliases.push((alias.clone(), alias.clone()));
                    }
                    if selected.insert(alias) {
                        columns.push(item.to_string());
                    }
                }
                None => {
                    return Err(FinderError::InvalidColumn {
                        entity: self.entity.name.clone(),
                        column: item.to_string(),
                    })
                }
            }
        }

        for column in self.table.primary_key.columns() {
            if let Some(alias) = self.column_alias(column) {
                if !selected.contains(alias) {
                    columns.push(self.aliased(column, alias));
                }
            }
        }

        Ok(columns.join(", "))
    }

    /// Select list of the primary key columns only
    pub fn pk_select(&self) -> String {
        self.table
            .primary_key
            .columns()
            .into_iter()
            .filter_map(|c| self.column_alias(c).map(|a| self.aliased(c, a)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Primary key read from a result row through the column aliases
    pub fn read_key(&self, row: &Row) -> Option<KeyValue> {
        self.table
            .primary_key
            .value_from(|c| self.column_alias(c).and_then(|a| row.get(a)))
    }

    /// Primary key read from a record's attributes
    pub fn key_of(&self, record: &Record) -> Option<KeyValue> {
        self.table.primary_key.value_from(|c| record.get(c))
    }

    /// Attributes decoded from a row through this node's aliases
    pub fn decode(&self, row: &Row) -> Row {
        let mut attributes = Row::with_capacity(self.column_aliases.len());
        for (name, alias) in &self.column_aliases {
            if let Some(value) = row.get(alias) {
                attributes.push(name, value.clone());
            }
        }
        attributes
    }

    /// Condition restricting this node's table to the keys of its records.
    ///
    /// `next_param` names each placeholder. An empty cache yields `0=1`.
    pub fn pk_range<F>(&self, mut next_param: F) -> (String, Vec<(String, Value)>)
    where
        F: FnMut() -> String,
    {
        key_range(
            &self.column_prefix(),
            &self.table.primary_key.columns(),
            self.records.entries().iter().map(|(k, _)| k.values()),
            &mut next_param,
        )
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.attached.clear();
    }
}

/// `prefix.col IN (...)`, or OR-ed AND groups for composite keys
pub(crate) fn key_range<'v, I, F>(
    prefix: &str,
    columns: &[&str],
    keys: I,
    next_param: &mut F,
) -> (String, Vec<(String, Value)>)
where
    I: Iterator<Item = Vec<&'v Value>>,
    F: FnMut() -> String,
{
    let mut params = Vec::new();
    let mut groups = Vec::new();
    for values in keys {
        let mut parts = Vec::with_capacity(columns.len());
        for (column, value) in columns.iter().zip(values) {
            let name = next_param();
            parts.push((format!("{prefix}{}", quote_column_name(column)), name.clone()));
            params.push((name, value.clone()));
        }
        groups.push(parts);
    }

    if groups.is_empty() {
        return ("0=1".to_string(), params);
    }

    let sql = if columns.len() == 1 {
        let column = format!("{prefix}{}", quote_column_name(columns[0]));
        let names: Vec<&str> = groups
            .iter()
            .filter_map(|g| g.first().map(|(_, n)| n.as_str()))
            .collect();
        format!("{column} IN ({})", names.join(", "))
    } else {
        groups
            .iter()
            .map(|g| {
                let ands: Vec<String> = g.iter().map(|(c, n)| format!("{c}={n}")).collect();
                format!("({})", ands.join(" AND "))
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    };
    (sql, params)
}
