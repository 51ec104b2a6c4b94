//! Schema catalog and relation registry.
//!
//! Both are read-only collaborators: built once per process and passed to
//! every finder explicitly. `Registry` is an in-memory implementation of
//! both traits.

use crate::error::FinderError;
use crate::query::criteria::Criteria;
use crate::relation::def::RelationDef;
use crate::schema::{EntityType, TableSchema};
use std::collections::HashMap;

/// Table and entity metadata
pub trait SchemaCatalog {
    fn entity(&self, name: &str) -> Option<&EntityType>;

    fn table(&self, name: &str) -> Option<&TableSchema>;

    /// Entity type and its table, or `UnknownEntity`
    ///
    /// # Errors
    ///
    /// Returns `FinderError::UnknownEntity` if either lookup fails.
    fn resolve(&self, entity: &str) -> Result<(&EntityType, &TableSchema), FinderError> {
        let e = self
            .entity(entity)
            .ok_or_else(|| FinderError::UnknownEntity(entity.to_string()))?;
        let t = self
            .table(&e.table)
            .ok_or_else(|| FinderError::UnknownEntity(entity.to_string()))?;
        Ok((e, t))
    }
}

/// Relation and named-scope lookup per entity type
pub trait RelationRegistry: SchemaCatalog {
    fn relation(&self, entity: &str, name: &str) -> Option<&RelationDef>;

    fn scope(&self, entity: &str, name: &str) -> Option<&Criteria>;
}

/// In-memory catalog and registry
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: HashMap<String, TableSchema>,
    entities: HashMap<String, EntityType>,
    relations: HashMap<String, HashMap<String, RelationDef>>,
    scopes: HashMap<String, HashMap<String, Criteria>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn entity(mut self, name: &str, table: &str) -> Self {
        self.entities
            .insert(name.to_string(), EntityType::new(name, table));
        self
    }

    /// Register a relation of `entity`, replacing one of the same name
    pub fn relation(mut self, entity: &str, def: RelationDef) -> Self {
        self.relations
            .entry(entity.to_string())
            .or_default()
            .insert(def.name.clone(), def);
        self
    }

    pub fn scope(mut self, entity: &str, name: &str, criteria: Criteria) -> Self {
        self.scopes
            .entry(entity.to_string())
            .or_default()
            .insert(name.to_string(), criteria);
        self
    }

    /// Relation names of `entity`, sorted
    pub fn relation_names(&self, entity: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .relations
            .get(entity)
            .map(|r| r.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}

impl SchemaCatalog for Registry {
    fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }
}

impl RelationRegistry for Registry {
    fn relation(&self, entity: &str, name: &str) -> Option<&RelationDef> {
        self.relations.get(entity)?.get(name)
    }

    fn scope(&self, entity: &str, name: &str) -> Option<&Criteria> {
        self.scopes.get(entity)?.get(name)
    }
}
