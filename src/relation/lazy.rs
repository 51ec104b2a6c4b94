//! Lazy loading of one relation for an existing record.
//!
//! The record is registered as the root of a fresh join tree. Each
//! requested relation is fetched with its own statement whose condition
//! pins the foreign key to the record's values, and the result is attached
//! to the record in place. Nested relations of the loaded records are
//! resolved the same way an eager find resolves deferred relations.
//!
//! # Example
//!
//! ```no_run
//! use active_finder::{FinderExecutor, LazyLoader, RecordRef, Registry};
//!
//! # fn run(registry: &Registry, executor: &dyn FinderExecutor, order: &RecordRef) -> Result<(), active_finder::FinderError> {
//! let loader = LazyLoader::new(registry, executor);
//! loader.load(order, "items")?;
//! println!("{} items", order.borrow().many("items").len());
//! # Ok(())
//! # }
//! ```

use crate::config::FinderConfig;
use crate::error::FinderError;
use crate::executor::FinderExecutor;
use crate::finder::join::{self, JoinPolicy, ParamNames};
use crate::finder::{ActiveFinder, JoinTree, NodeId, ROOT};
use crate::query::join_query::JoinQuery;
use crate::record::{Related, RecordRef};
use crate::registry::RelationRegistry;
use crate::relation::def::RelationKind;
use crate::relation::eager::find_node;
use crate::relation::spec::RelationSpec;
use crate::schema::quote_column_name;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Loads relations of already materialized records on demand
pub struct LazyLoader<'a, Ex: FinderExecutor + ?Sized> {
    registry: &'a dyn RelationRegistry,
    executor: &'a Ex,
    config: FinderConfig,
}

impl<'a, Ex: FinderExecutor + ?Sized> LazyLoader<'a, Ex> {
    pub fn new(registry: &'a dyn RelationRegistry, executor: &'a Ex) -> Self {
        Self::with_config(registry, executor, FinderConfig::default())
    }

    pub fn with_config(registry: &'a dyn RelationRegistry, executor: &'a Ex, config: FinderConfig) -> Self {
        Self {
            registry,
            executor,
            config,
        }
    }

    /// Fetch `spec` for `record` and attach the result to it.
    ///
    /// A singular relation gets the first matching record, or none. A plural
    /// relation gets the full collection, empty when nothing matched.
    ///
    /// # Errors
    ///
    /// `UnknownRelation` and other tree errors for a bad specification,
    /// `MissingAttribute` when the record lacks a key value the condition
    /// needs, `Execution` when a statement fails.
    pub fn load<S: Into<RelationSpec>>(&self, record: &RecordRef, spec: S) -> Result<(), FinderError> {
        let entity = record.borrow().entity().to_string();
        let specs = [spec.into()];
        let mut finder = ActiveFinder::with_config(self.registry, &entity, &specs, self.config.clone())?;
        let result = finder.lazy_find(self.executor, record);
        finder.destroy();
        result
    }
}

/// Resolve every relation of `finder`'s tree for `record`
pub(crate) fn lazy_find<Ex>(finder: &mut ActiveFinder<'_>, executor: &Ex, record: &RecordRef) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    finder.clear_records();
    finder.tree.reset_joined();
    finder.tree.register(ROOT, record)?;
    finder.tree.node_mut(ROOT).joined = true;
    finder.policy = JoinPolicy {
        join_all: finder.config.join_all,
        base_limited: false,
    };

    finder.run_stats(executor, ROOT)?;

    let children: Vec<NodeId> = finder
        .tree
        .root()
        .children()
        .iter()
        .copied()
        .filter(|&c| finder.tree.node(c).master().is_none())
        .collect();
    for child in children {
        load_child(finder, executor, record, child)?;
    }
    Ok(())
}

fn load_child<Ex>(finder: &mut ActiveFinder<'_>, executor: &Ex, record: &RecordRef, child: NodeId) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    let Some(relation) = finder.tree.node(child).relation().cloned() else {
        return Ok(());
    };

    #[cfg(feature = "tracing")]
    let _span = {
        let entity = record.borrow().entity().to_string();
        tracing_helpers::lazy_load_span(&entity, &relation.name).entered()
    };

    let mut query = JoinQuery::new();
    let select = finder.tree.node_mut(child).column_select(&relation.select)?;
    query.add_select(&select);
    query.add_join(&finder.tree.node(child).table_with_alias());
    let fragments = query.bind(
        &relation.params,
        vec![
            relation.condition.clone(),
            relation.on.clone(),
            relation.join.clone(),
            relation.group.clone(),
            relation.having.clone(),
            relation.order.clone(),
        ],
    );
    if let [condition, on, extra_join, group, having, order] = fragments.as_slice() {
        query.add_condition(condition);
        query.add_condition(on);
        query.add_join(extra_join);
        query.add_group(group);
        query.add_having(having);
        query.add_order(order);
    }
    if relation.kind.is_plural() {
        query.limit = relation.limit;
        query.offset = relation.offset;
    }
    query.elements.insert(child);

    apply_lazy_condition(&finder.tree, &mut finder.names, &mut query, child, record)?;

    finder.tree.node_mut(child).joined = true;
    let policy = finder.policy;
    join::build_children(&mut finder.tree, &mut query, child, policy)?;
    let rows = finder.run_query(executor, &query, child)?;
    log::trace!("lazy relation {} returned {rows} rows", relation.name);

    let grandchildren = finder.tree.node(child).children().to_vec();
    for grandchild in grandchildren {
        find_node(finder, executor, grandchild)?;
    }
    finder.run_stats(executor, child)?;

    let records = finder.tree.node(child).records();
    let mut base = record.borrow_mut();
    if relation.kind.is_singular() {
        base.set_related(&relation.name, Related::One(records.into_iter().next()));
    } else {
        base.set_related(
            &relation.name,
            Related::empty_collection(relation.index.is_some()),
        );
        for related in records {
            base.attach_many(&relation.name, related, relation.index.as_deref());
        }
    }

    #[cfg(feature = "metrics")]
    METRICS.record_lazy_load();
    Ok(())
}

/// Restrict `query` to the rows related to `record`.
///
/// Many-many relations inner join the junction table pinned to the
/// record's key. Other relations walk the chain of through relations,
/// joining each intermediate table, and pin the last one's foreign key.
fn apply_lazy_condition(
    tree: &JoinTree<'_>,
    names: &mut ParamNames,
    query: &mut JoinQuery,
    child: NodeId,
    record: &RecordRef,
) -> Result<(), FinderError> {
    let node = tree.node(child);
    let Some(relation) = node.relation() else {
        return Ok(());
    };
    let parent = tree.root();
    let record = record.borrow();
    let missing = |attribute: &str| FinderError::MissingAttribute {
        entity: record.entity().to_string(),
        attribute: attribute.to_string(),
    };

    if relation.kind == RelationKind::ManyToMany {
        let junction = relation
            .junction
            .as_ref()
            .ok_or_else(|| FinderError::IncompleteForeignKey {
                entity: parent.entity().name.clone(),
                relation: relation.name.clone(),
            })?;
        let table = node.junction_table.ok_or_else(|| FinderError::UnknownTable {
            entity: parent.entity().name.clone(),
            relation: relation.name.clone(),
            table: junction.table.clone(),
        })?;
        let pairs = join::junction_pairs(parent, node, table, &junction.columns, &relation.name)?;
        let alias = join::junction_alias(node, relation);

        let mut conditions = Vec::with_capacity(pairs.parent.len() + pairs.child.len());
        for (pk, fk) in &pairs.parent {
            let value = record.get(pk).ok_or_else(|| missing(pk))?;
            let name = names.next();
            conditions.push(format!("{alias}.{}={name}", quote_column_name(fk)));
            query.params.push((name, value.clone()));
        }
        for (pk, fk) in &pairs.child {
            conditions.push(format!(
                "{}{}={alias}.{}",
                node.column_prefix(),
                quote_column_name(pk),
                quote_column_name(fk)
            ));
        }
        query.add_join(&format!(
            "INNER JOIN {} {alias} ON ({})",
            table.raw_name(),
            conditions.join(") AND (")
        ));
        return Ok(());
    }

    let mut element = node;
    while let Some(slave) = element.slave() {
        let slave = tree.node(slave);
        let Some(through) = element.relation() else {
            break;
        };
        if let Some(slave_relation) = slave.relation() {
            let fragments = query.bind(&slave_relation.params, vec![slave_relation.condition.clone()]);
            for condition in &fragments {
                query.add_condition(condition);
            }
        }
        let join = join::one_many_join(slave, slave, element, &through.foreign_key, &parent.entity().name)?;
        query.add_join(&join);
        element = slave;
    }

    let Some(last) = element.relation() else {
        return Ok(());
    };
    // (column of the pinned table, attribute of the record)
    let pins: Vec<(String, String)> = if last.kind == RelationKind::BelongsTo {
        join::one_many_pairs(parent, element, &last.foreign_key, &parent.entity().name, &last.name)?
            .into_iter()
            .map(|(fk, pk)| (pk, fk))
            .collect()
    } else {
        join::one_many_pairs(element, parent, &last.foreign_key, &parent.entity().name, &last.name)?
    };
    for (column, attribute) in &pins {
        let value = record.get(attribute).ok_or_else(|| missing(attribute))?;
        let name = names.next();
        query.add_condition(&format!(
            "{}{}={name}",
            element.column_prefix(),
            quote_column_name(column)
        ));
        query.params.push((name, value.clone()));
    }
    Ok(())
}
