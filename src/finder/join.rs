//! Join condition compilation and statement assembly over a join tree.
//!
//! One-many relations (BelongsTo, HasOne, HasMany, Stat) are joined with one
//! equality per foreign key column. Many-many relations are joined through
//! a uniquely aliased junction table. In both cases declared foreign key
//! constraints are consulted first and primary key order is the fallback.

use crate::error::FinderError;
use crate::finder::node::{JoinNode, NodeId, ROOT};
use crate::finder::tree::JoinTree;
use crate::query::criteria::Criteria;
use crate::query::join_query::JoinQuery;
use crate::relation::def::{ForeignKey, RelationDef, RelationKind};
use crate::schema::{compare_table_names, quote_column_name, quote_table_name, TableSchema};

/// Which children are joined into the statement under construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct JoinPolicy {
    /// Join every relation regardless of row limits
    pub join_all: bool,
    /// The base rows are bounded by LIMIT/OFFSET
    pub base_limited: bool,
}

impl JoinPolicy {
    /// Whether a child with `relation` is joined rather than deferred
    pub(crate) fn joins(self, relation: &RelationDef) -> bool {
        relation.kind.is_singular()
            || self.join_all
            || relation.together == Some(true)
            || (!self.base_limited && relation.together.is_none())
    }
}

/// Generated placeholder names for key ranges and lazy conditions
#[derive(Debug, Default)]
pub(crate) struct ParamNames {
    next: usize,
}

impl ParamNames {
    pub(crate) fn next(&mut self) -> String {
        let name = format!(":ap{}", self.next);
        self.next += 1;
        name
    }
}

/// Statement over the root node for `criteria`
pub(crate) fn root_query(tree: &mut JoinTree<'_>, criteria: &Criteria) -> Result<JoinQuery, FinderError> {
    let mut query = JoinQuery::new();
    let select = tree.node_mut(ROOT).column_select(&criteria.select)?;
    query.add_select(&select);
    query.add_join(&tree.root().table_with_alias());

    let fragments = query.bind(
        &criteria.params,
        vec![
            criteria.join.clone(),
            criteria.condition.clone(),
            criteria.order.clone(),
            criteria.group.clone(),
            criteria.having.clone(),
        ],
    );
    if let [join, condition, order, group, having] = fragments.as_slice() {
        query.add_join(join);
        query.add_condition(condition);
        query.add_order(order);
        query.add_group(group);
        query.add_having(having);
    }

    query.distinct = criteria.distinct;
    query.limit = criteria.limit;
    query.offset = criteria.offset;
    query.elements.insert(ROOT);
    Ok(query)
}

/// Statement selecting the keys of `id`'s cached records, to join children onto
pub(crate) fn range_query(tree: &JoinTree<'_>, id: NodeId, names: &mut ParamNames) -> JoinQuery {
    let node = tree.node(id);
    let mut query = JoinQuery::new();
    query.add_select(&node.pk_select());
    query.add_join(&node.table_with_alias());
    let (range, params) = node.pk_range(|| names.next());
    query.add_condition(&range);
    query.params.extend(params);
    query.elements.insert(id);
    query
}

/// Join the children of `id` that `policy` allows, depth first
pub(crate) fn build_children(
    tree: &mut JoinTree<'_>,
    query: &mut JoinQuery,
    id: NodeId,
    policy: JoinPolicy,
) -> Result<(), FinderError> {
    let children = tree.node(id).children.clone();
    for child in children {
        let node = tree.node(child);
        if node.master.is_some() {
            tree.node_mut(child).joined = true;
            continue;
        }
        let joins = node.relation().is_some_and(|r| policy.joins(r));
        if joins {
            tree.node_mut(child).joined = true;
            join_node(tree, query, child)?;
            build_children(tree, query, child, policy)?;
        }
    }
    Ok(())
}

/// Add the fragments of one node, and of its slave before it
pub(crate) fn join_node(tree: &mut JoinTree<'_>, query: &mut JoinQuery, id: NodeId) -> Result<(), FinderError> {
    if let Some(slave) = tree.node(id).slave {
        join_node(tree, query, slave)?;
    }

    let select = tree.node(id).selection();
    if !select.is_empty() {
        let columns = tree.node_mut(id).column_select(&select)?;
        query.add_select(&columns);
    }

    let join = join_condition(tree, id)?;
    let Some(relation) = tree.node(id).relation() else {
        return Ok(());
    };
    let fragments = query.bind(
        &relation.params,
        vec![
            relation.condition.clone(),
            relation.order.clone(),
            join,
            relation.join.clone(),
            relation.group.clone(),
            relation.having.clone(),
        ],
    );
    if let [condition, order, join, extra_join, group, having] = fragments.as_slice() {
        query.add_condition(condition);
        query.add_order(order);
        query.add_join(join);
        query.add_join(extra_join);
        query.add_group(group);
        query.add_having(having);
    }
    query.elements.insert(id);
    Ok(())
}

/// JOIN clause connecting `id` to its parent
///
/// # Errors
///
/// `InvalidForeignKey` for a key column missing from the table that must hold
/// it, `IncompleteForeignKey` when the key does not reference both sides.
pub(crate) fn join_condition(tree: &JoinTree<'_>, id: NodeId) -> Result<String, FinderError> {
    let node = tree.node(id);
    let (Some(relation), Some(parent)) = (node.relation(), node.parent) else {
        return Ok(String::new());
    };
    let parent = tree.node(parent);

    if relation.kind == RelationKind::ManyToMany {
        return join_many_many(node, parent, relation);
    }

    let (fke, pke) = match node.slave {
        Some(slave) => (tree.node(slave), node),
        None if relation.kind == RelationKind::BelongsTo => (parent, node),
        None => (node, parent),
    };
    one_many_join(node, fke, pke, &relation.foreign_key, &parent.entity.name)
}

/// `<join type> <table> <alias> ON (fk=pk) AND ...` joining `joined`
pub(crate) fn one_many_join(
    joined: &JoinNode<'_>,
    fke: &JoinNode<'_>,
    pke: &JoinNode<'_>,
    foreign_key: &ForeignKey,
    entity: &str,
) -> Result<String, FinderError> {
    let Some(relation) = joined.relation() else {
        return Ok(String::new());
    };
    let pairs = one_many_pairs(fke, pke, foreign_key, entity, &relation.name)?;
    let mut predicates: Vec<String> = pairs
        .iter()
        .map(|(fk, pk)| {
            format!(
                "{}{}={}{}",
                fke.column_prefix(),
                quote_column_name(fk),
                pke.column_prefix(),
                quote_column_name(pk)
            )
        })
        .collect();
    if !relation.on.trim().is_empty() {
        predicates.push(relation.on.clone());
    }
    Ok(format!(
        "{} {} ON ({})",
        relation.join_type.as_sql(),
        joined.table_with_alias(),
        predicates.join(") AND (")
    ))
}

/// Resolve foreign key columns of `fke` against the primary key side `pke`.
///
/// Returns `(fk column, pk column)` pairs. An explicit mapping is taken as
/// is; a column list is resolved through declared constraints on `fke`,
/// falling back to `pke`'s primary key at the same position.
pub(crate) fn one_many_pairs(
    fke: &JoinNode<'_>,
    pke: &JoinNode<'_>,
    foreign_key: &ForeignKey,
    entity: &str,
    relation: &str,
) -> Result<Vec<(String, String)>, FinderError> {
    let invalid = |key: &str| FinderError::InvalidForeignKey {
        entity: entity.to_string(),
        relation: relation.to_string(),
        key: key.to_string(),
        table: fke.table.name.clone(),
    };
    let incomplete = || FinderError::IncompleteForeignKey {
        entity: entity.to_string(),
        relation: relation.to_string(),
    };

    let mut pairs = Vec::with_capacity(foreign_key.len());
    match foreign_key {
        ForeignKey::Mapping(mapping) => {
            for (fk, pk) in mapping {
                if !fke.table.has_column(fk) {
                    return Err(invalid(fk));
                }
                pairs.push((fk.clone(), pk.clone()));
            }
        }
        ForeignKey::Columns(columns) => {
            for (i, fk) in columns.iter().enumerate() {
                if !fke.table.has_column(fk) {
                    return Err(invalid(fk));
                }
                let pk = match fke.table.foreign_key_to(fk, &pke.table.name) {
                    Some(reference) => reference.column.clone(),
                    None => pke
                        .table
                        .primary_key
                        .column_at(i)
                        .map(str::to_string)
                        .ok_or_else(incomplete)?,
                };
                pairs.push((fk.clone(), pk));
            }
        }
    }

    if pairs.is_empty() {
        return Err(incomplete());
    }
    Ok(pairs)
}

/// Junction columns split by the side they reference.
///
/// Each side is a list of `(primary key column, junction column)` pairs,
/// one entry per primary key column.
pub(crate) struct JunctionPairs {
    pub parent: Vec<(String, String)>,
    pub child: Vec<(String, String)>,
}

fn put(side: &mut Vec<(String, String)>, pk: &str, fk: &str) {
    match side.iter_mut().find(|(p, _)| p == pk) {
        Some(entry) => entry.1 = fk.to_string(),
        None => side.push((pk.to_string(), fk.to_string())),
    }
}

/// Resolve which junction columns reference `parent` and which `child`
///
/// # Errors
///
/// `InvalidForeignKey` for a column missing from the junction table,
/// `IncompleteForeignKey` unless both sides are referenced.
pub(crate) fn junction_pairs(
    parent: &JoinNode<'_>,
    child: &JoinNode<'_>,
    junction: &TableSchema,
    columns: &[String],
    relation: &str,
) -> Result<JunctionPairs, FinderError> {
    let entity = parent.entity.name.as_str();
    for fk in columns {
        if !junction.has_column(fk) {
            return Err(FinderError::InvalidForeignKey {
                entity: entity.to_string(),
                relation: relation.to_string(),
                key: fk.clone(),
                table: junction.name.clone(),
            });
        }
    }

    let mut pairs = JunctionPairs {
        parent: Vec::new(),
        child: Vec::new(),
    };
    let mut constrained = !columns.is_empty();
    for fk in columns {
        let Some(reference) = junction.foreign_key(fk) else {
            constrained = false;
            break;
        };
        let pk = reference.column.as_str();
        let parent_free = !pairs.parent.iter().any(|(p, _)| p == pk);
        let child_free = !pairs.child.iter().any(|(p, _)| p == pk);
        if parent_free && compare_table_names(&parent.table.name, &reference.table) {
            pairs.parent.push((pk.to_string(), fk.clone()));
        } else if child_free && compare_table_names(&child.table.name, &reference.table) {
            pairs.child.push((pk.to_string(), fk.clone()));
        } else {
            constrained = false;
            break;
        }
    }

    if !constrained {
        log::trace!("junction {} has no usable constraints, pairing by position", junction.name);
        pairs.parent.clear();
        pairs.child.clear();
        let arity = parent.table.primary_key.arity();
        for (i, fk) in columns.iter().enumerate() {
            if i < arity {
                if let Some(pk) = parent.table.primary_key.column_at(i) {
                    put(&mut pairs.parent, pk, fk);
                }
            } else if let Some(pk) = child.table.primary_key.column_at(i - arity) {
                put(&mut pairs.child, pk, fk);
            }
        }
    }

    if pairs.parent.is_empty() || pairs.child.is_empty() {
        return Err(FinderError::IncompleteForeignKey {
            entity: entity.to_string(),
            relation: relation.to_string(),
        });
    }
    Ok(pairs)
}

/// Quoted alias of the junction table joined for `node`
pub(crate) fn junction_alias(node: &JoinNode<'_>, relation: &RelationDef) -> String {
    quote_table_name(&format!("{}_{}", relation.name, node.table_alias))
}

fn join_many_many(node: &JoinNode<'_>, parent: &JoinNode<'_>, relation: &RelationDef) -> Result<String, FinderError> {
    let incomplete = || FinderError::IncompleteForeignKey {
        entity: parent.entity.name.clone(),
        relation: relation.name.clone(),
    };
    let junction = relation.junction.as_ref().ok_or_else(incomplete)?;
    let table = node.junction_table.ok_or_else(|| FinderError::UnknownTable {
        entity: parent.entity.name.clone(),
        relation: relation.name.clone(),
        table: junction.table.clone(),
    })?;

    let pairs = junction_pairs(parent, node, table, &junction.columns, &relation.name)?;
    let alias = junction_alias(node, relation);
    let parent_condition: Vec<String> = pairs
        .parent
        .iter()
        .map(|(pk, fk)| {
            format!(
                "{}{}={alias}.{}",
                parent.column_prefix(),
                quote_column_name(pk),
                quote_column_name(fk)
            )
        })
        .collect();
    let child_condition: Vec<String> = pairs
        .child
        .iter()
        .map(|(pk, fk)| {
            format!(
                "{}{}={alias}.{}",
                node.column_prefix(),
                quote_column_name(pk),
                quote_column_name(fk)
            )
        })
        .collect();

    let join_type = relation.join_type.as_sql();
    let mut join = format!(
        "{join_type} {} {alias} ON ({}) {join_type} {} ON ({})",
        table.raw_name(),
        parent_condition.join(") AND ("),
        node.table_with_alias(),
        child_condition.join(") AND (")
    );
    if !relation.on.trim().is_empty() {
        join.push_str(&format!(" AND ({})", relation.on));
    }
    Ok(join)
}
