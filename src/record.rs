//! Materialized records.
//!
//! A record holds the decoded attributes of one row of one join node and the
//! relations resolved for it so far. Records are shared (`Rc<RefCell<_>>`)
//! because the same instance is reachable from the node cache and from every
//! parent that references it. Links only point from parent to child, so
//! dropping the finder and the caller's handles frees the whole graph.

use crate::relation::identity::KeyValue;
use crate::value::{display_value, Row};
use sea_query::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type RecordRef = Rc<RefCell<Record>>;

/// Resolved value of one relation
#[derive(Debug, Clone)]
pub enum Related {
    /// BelongsTo / HasOne
    One(Option<RecordRef>),
    /// HasMany / ManyToMany, in first-seen order
    Many(Vec<RecordRef>),
    /// HasMany / ManyToMany keyed by the relation's index attribute
    Indexed(Vec<(String, RecordRef)>),
    /// Aggregate of a Stat relation
    Stat(Value),
}

impl Related {
    /// Empty placeholder for a plural relation
    pub fn empty_collection(indexed: bool) -> Self {
        if indexed {
            Related::Indexed(Vec::new())
        } else {
            Related::Many(Vec::new())
        }
    }

    /// Records held, in order
    pub fn records(&self) -> Vec<RecordRef> {
        match self {
            Related::One(r) => r.iter().cloned().collect(),
            Related::Many(v) => v.clone(),
            Related::Indexed(v) => v.iter().map(|(_, r)| r.clone()).collect(),
            Related::Stat(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(r) => usize::from(r.is_some()),
            Related::Many(v) => v.len(),
            Related::Indexed(v) => v.len(),
            Related::Stat(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded entity instance
#[derive(Debug, Clone)]
pub struct Record {
    entity: String,
    attributes: Row,
    key: Option<KeyValue>,
    related: HashMap<String, Related>,
}

impl Record {
    pub fn new(entity: &str, attributes: Row, key: Option<KeyValue>) -> Self {
        Self {
            entity: entity.to_string(),
            attributes,
            key,
            related: HashMap::new(),
        }
    }

    pub fn into_ref(self) -> RecordRef {
        Rc::new(RefCell::new(self))
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn key(&self) -> Option<&KeyValue> {
        self.key.as_ref()
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn set(&mut self, attribute: &str, value: Value) {
        self.attributes.push(attribute, value);
    }

    pub fn has_related(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    pub fn related(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// Names of the relations resolved so far
    pub fn related_names(&self) -> Vec<&str> {
        self.related.keys().map(String::as_str).collect()
    }

    pub fn set_related(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
    }

    /// Initialize `name` unless it is already present
    pub fn init_related(&mut self, name: &str, related: Related) {
        self.related.entry(name.to_string()).or_insert(related);
    }

    /// Record held by a singular relation
    pub fn one(&self, name: &str) -> Option<RecordRef> {
        match self.related.get(name)? {
            Related::One(r) => r.clone(),
            _ => None,
        }
    }

    /// Records of a plural relation, empty when unresolved
    pub fn many(&self, name: &str) -> Vec<RecordRef> {
        self.related
            .get(name)
            .map(Related::records)
            .unwrap_or_default()
    }

    pub fn stat(&self, name: &str) -> Option<&Value> {
        match self.related.get(name)? {
            Related::Stat(v) => Some(v),
            _ => None,
        }
    }

    /// Attach a singular relation; a missing record never replaces a present one
    pub fn attach_one(&mut self, name: &str, record: Option<RecordRef>) {
        match (self.related.get_mut(name), record) {
            (Some(Related::One(slot)), Some(r)) => *slot = Some(r),
            (Some(_), None) => {}
            (_, r) => {
                self.related.insert(name.to_string(), Related::One(r));
            }
        }
    }

    /// Append to a plural relation, or key it by `index` when given.
    ///
    /// An existing entry under the same index is overwritten in place.
    pub fn attach_many(&mut self, name: &str, record: RecordRef, index: Option<&str>) {
        let index_key = index.map(|attr| {
            record
                .borrow()
                .get(attr)
                .map(display_value)
                .unwrap_or_default()
        });
        let slot = self
            .related
            .entry(name.to_string())
            .or_insert_with(|| Related::empty_collection(index_key.is_some()));
        match (slot, index_key) {
            (Related::Indexed(entries), Some(key)) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = record,
                    None => entries.push((key, record)),
                }
            }
            (Related::Many(entries), _) => entries.push(record),
            (slot, Some(key)) => *slot = Related::Indexed(vec![(key, record)]),
            (slot, None) => *slot = Related::Many(vec![record]),
        }
    }

    /// Drop every resolved relation
    pub fn clear_related(&mut self) {
        self.related.clear();
    }
}
