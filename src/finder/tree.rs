//! Join tree construction.
//!
//! The tree is an arena: nodes live in one `Vec` and refer to each other by
//! index. Node ids double as column alias prefixes, so they are assigned in
//! construction order and never reused.

use crate::error::FinderError;
use crate::finder::node::{JoinNode, NodeId, ROOT};
use crate::record::{Related, RecordRef};
use crate::registry::RelationRegistry;
use crate::relation::def::{RelationDef, Selection};
use crate::relation::spec::{RelationOptions, RelationSpec};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Arena of join nodes rooted at the base entity
#[derive(Debug)]
pub struct JoinTree<'a> {
    nodes: Vec<JoinNode<'a>>,
    alias_prefix: String,
}

impl<'a> JoinTree<'a> {
    /// Tree holding only the root node of `entity`
    ///
    /// # Errors
    ///
    /// Returns `FinderError::UnknownEntity` if the entity is not in the catalog.
    pub fn new(
        registry: &'a dyn RelationRegistry,
        entity: &str,
        root_alias: &str,
        alias_prefix: &str,
    ) -> Result<Self, FinderError> {
        let (entity, table) = registry.resolve(entity)?;
        let root = JoinNode::new(
            ROOT,
            entity,
            table,
            None,
            root_alias.to_string(),
            None,
            alias_prefix,
        );
        Ok(Self {
            nodes: vec![root],
            alias_prefix: alias_prefix.to_string(),
        })
    }

    /// Build the tree for `entity` and every relation in `with`
    ///
    /// # Errors
    ///
    /// Returns the first resolution error; no partial tree is returned.
    pub fn build(
        registry: &'a dyn RelationRegistry,
        entity: &str,
        with: &[RelationSpec],
        root_alias: &str,
        alias_prefix: &str,
    ) -> Result<Self, FinderError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::build_join_tree_span(entity).entered();

        let mut tree = Self::new(registry, entity, root_alias, alias_prefix)?;
        let mut builder = TreeBuilder {
            registry,
            tree: &mut tree,
        };
        for spec in with {
            builder.build(ROOT, spec)?;
        }
        log::trace!("built join tree for {entity} with {} nodes", tree.len());
        Ok(tree)
    }

    pub fn root(&self) -> &JoinNode<'a> {
        &self.nodes[ROOT]
    }

    pub fn node(&self, id: NodeId) -> &JoinNode<'a> {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut JoinNode<'a> {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JoinNode<'a>> {
        self.nodes.iter()
    }

    /// Joinable child of `parent` for relation `name`
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name() == name)
    }

    /// Stat child of `parent` for relation `name`
    pub fn stat_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[parent]
            .stats
            .iter()
            .copied()
            .find(|&c| self.nodes[c].name() == name)
    }

    /// Node for a dotted relation path from the root
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut id = ROOT;
        for segment in path.split('.') {
            id = self
                .child(id, segment)
                .or_else(|| self.stat_child(id, segment))?;
        }
        Some(id)
    }

    pub(crate) fn set_root_alias(&mut self, alias: &str) {
        self.nodes[ROOT].table_alias = alias.to_string();
    }

    pub(crate) fn reset_joined(&mut self) {
        for node in &mut self.nodes {
            node.joined = false;
        }
    }

    /// Register an existing record in a node's cache.
    ///
    /// Selected relations get their empty placeholders, as when the record
    /// is decoded from a row.
    ///
    /// # Errors
    ///
    /// Returns `FinderError::MissingAttribute` if the record lacks a primary key column.
    pub(crate) fn register(&mut self, id: NodeId, record: &RecordRef) -> Result<(), FinderError> {
        let node = &self.nodes[id];
        let key = node.key_of(&record.borrow()).ok_or_else(|| {
            let missing = node
                .table
                .primary_key
                .columns()
                .into_iter()
                .find(|c| record.borrow().get(c).is_none())
                .unwrap_or_default()
                .to_string();
            FinderError::MissingAttribute {
                entity: node.entity.name.clone(),
                attribute: missing,
            }
        })?;
        self.init_placeholders(id, record);
        self.nodes[id].records.insert(key, record.clone());
        Ok(())
    }

    /// Empty related slots for every selected child relation of `id`
    pub(crate) fn init_placeholders(&self, id: NodeId, record: &RecordRef) {
        let mut record = record.borrow_mut();
        for &child in &self.nodes[id].children {
            let Some(relation) = self.nodes[child].relation() else {
                continue;
            };
            if relation.select.is_empty() {
                continue;
            }
            let placeholder = if relation.kind.is_plural() {
                Related::empty_collection(relation.index.is_some())
            } else {
                Related::One(None)
            };
            record.init_related(&relation.name, placeholder);
        }
    }

    /// Release every record cache
    pub fn clear_records(&mut self) {
        for node in &mut self.nodes {
            node.clear();
        }
    }

    /// Drop every node except a bare root and sever all links
    pub(crate) fn destroy(&mut self) {
        self.clear_records();
        self.nodes.truncate(1);
        if let Some(root) = self.nodes.first_mut() {
            root.children.clear();
            root.stats.clear();
        }
    }
}

struct TreeBuilder<'t, 'a> {
    registry: &'a dyn RelationRegistry,
    tree: &'t mut JoinTree<'a>,
}

impl<'t, 'a> TreeBuilder<'t, 'a> {
    fn build(&mut self, parent: NodeId, spec: &RelationSpec) -> Result<(), FinderError> {
        match spec {
            RelationSpec::Path(path) => {
                self.resolve(parent, path, &[], None)?;
            }
            RelationSpec::PathWithScopes(path, scopes) => {
                self.resolve(parent, path, scopes, None)?;
            }
            RelationSpec::Nested(entries) => {
                for (name, options) in entries {
                    self.resolve(parent, name, &[], Some(options))?;
                }
            }
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        parent: NodeId,
        path: &str,
        extra_scopes: &[String],
        options: Option<&RelationOptions>,
    ) -> Result<NodeId, FinderError> {
        let (parent, segment) = match path.rfind('.') {
            Some(pos) => (self.resolve(parent, &path[..pos], &[], None)?, &path[pos + 1..]),
            None => (parent, path),
        };

        if self.tree.node(parent).is_stat() {
            return Err(FinderError::InvalidNesting {
                relation: self.tree.node(parent).name().to_string(),
            });
        }

        let (name, mut scopes) = match segment.find(':') {
            Some(pos) => (
                &segment[..pos],
                segment[pos + 1..]
                    .split(':')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            ),
            None => (segment, Vec::new()),
        };
        scopes.extend(extra_scopes.iter().cloned());

        let existing = self
            .tree
            .child(parent, name)
            .or_else(|| self.tree.stat_child(parent, name));
        if let Some(id) = existing {
            if self.tree.node(id).master.is_none() {
                if let Some(options) = options {
                    self.merge_into_existing(id, options)?;
                }
                return Ok(id);
            }
        }

        let registry = self.registry;
        let parent_entity = self.tree.node(parent).entity.name.clone();
        let mut relation = registry
            .relation(&parent_entity, name)
            .cloned()
            .ok_or_else(|| FinderError::UnknownRelation {
                entity: parent_entity.clone(),
                relation: name.to_string(),
            })?;

        let mut all_scopes = relation.scopes.clone();
        all_scopes.extend(scopes);
        if let Some(options) = options {
            all_scopes.extend(options.scopes.iter().cloned());
        }
        self.apply_scopes(&mut relation, &all_scopes)?;
        if let Some(options) = options {
            relation.merge_options(options);
        }

        if relation.kind.is_stat() {
            return self.add_stat(parent, relation);
        }

        // a slave re-requested directly keeps its node and links
        if let Some(id) = existing {
            let with = relation.with.clone();
            self.tree.node_mut(id).relation = Some(relation);
            for spec in &with {
                self.build(id, spec)?;
            }
            return Ok(id);
        }

        let (entity, table) = registry.resolve(&relation.entity)?;
        let junction_table = match (&relation.junction, relation.kind.is_plural()) {
            (Some(junction), true) => Some(registry.table(&junction.table).ok_or_else(|| {
                FinderError::UnknownTable {
                    entity: parent_entity.clone(),
                    relation: relation.name.clone(),
                    table: junction.table.clone(),
                }
            })?),
            _ => None,
        };

        let alias = self.table_alias(&relation);
        let id = self.tree.nodes.len();
        let through = relation.through.clone();
        let with = relation.with.clone();
        let mut node = JoinNode::new(
            id,
            entity,
            table,
            Some(relation),
            alias,
            Some(parent),
            &self.tree.alias_prefix,
        );
        node.junction_table = junction_table;
        self.tree.nodes.push(node);
        log::trace!("join node {id} for {parent_entity}.{name}");

        if let Some(through) = through {
            let slave = match self.tree.child(parent, &through) {
                Some(existing) => existing,
                None => self.resolve(
                    parent,
                    &through,
                    &[],
                    Some(&RelationOptions::new().select(Selection::None)),
                )?,
            };
            self.tree.node_mut(slave).master = Some(id);
            self.tree.node_mut(id).slave = Some(slave);
        }

        self.tree.node_mut(parent).children.push(id);

        for spec in &with {
            self.build(id, spec)?;
        }
        Ok(id)
    }

    fn apply_scopes(&self, relation: &mut RelationDef, scopes: &[String]) -> Result<(), FinderError> {
        for scope in scopes {
            let criteria = self.registry.scope(&relation.entity, scope).ok_or_else(|| {
                FinderError::UnknownScope {
                    entity: relation.entity.clone(),
                    scope: scope.clone(),
                }
            })?;
            relation.merge_criteria(criteria);
        }
        Ok(())
    }

    /// Per-call options given again for a node that already exists
    fn merge_into_existing(&mut self, id: NodeId, options: &RelationOptions) -> Result<(), FinderError> {
        let node = self.tree.node_mut(id);
        if let Some(relation) = node.relation.as_mut() {
            let alias = relation.alias.clone();
            relation.merge_options(options);
            // aliases are fixed once columns are prefixed with them
            relation.alias = alias;
        }
        if node.is_stat() && !options.with.is_empty() {
            return Err(FinderError::InvalidNesting {
                relation: node.name().to_string(),
            });
        }
        for spec in &options.with {
            self.build(id, spec)?;
        }
        Ok(())
    }

    fn add_stat(&mut self, parent: NodeId, relation: RelationDef) -> Result<NodeId, FinderError> {
        if !relation.with.is_empty() {
            return Err(FinderError::InvalidNesting {
                relation: relation.name,
            });
        }
        let registry = self.registry;
        let (entity, table) = registry.resolve(&relation.entity)?;
        let alias = self.table_alias(&relation);
        let id = self.tree.nodes.len();
        let node = JoinNode::new(
            id,
            entity,
            table,
            Some(relation),
            alias,
            Some(parent),
            &self.tree.alias_prefix,
        );
        self.tree.nodes.push(node);
        self.tree.node_mut(parent).stats.push(id);
        Ok(id)
    }

    /// Explicit alias or the relation name, made unique within the tree
    fn table_alias(&self, relation: &RelationDef) -> String {
        let base = relation.alias.as_deref().unwrap_or(&relation.name);
        if !self.tree.nodes.iter().any(|n| n.table_alias == base) {
            return base.to_string();
        }
        let id = self.tree.nodes.len();
        format!("{base}_{id}")
    }
}
