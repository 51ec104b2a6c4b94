//! Eager loading.
//!
//! The base statement joins every relation the join policy allows. Each
//! relation left out (a to-many relation under LIMIT/OFFSET, or one marked
//! `together(false)`) is resolved afterwards with one statement restricted
//! to the primary keys of its parent's records, so the number of statements
//! grows with the depth of the tree and not with the number of rows.

use crate::error::FinderError;
use crate::executor::FinderExecutor;
use crate::finder::join::{self, JoinPolicy};
use crate::finder::{ActiveFinder, NodeId, ROOT};
use crate::query::criteria::Criteria;
use crate::record::RecordRef;

/// Run the base statement, then every deferred and stat relation.
///
/// Returns the distinct base records in first-seen order.
///
/// # Errors
///
/// Returns the first compilation or execution error.
pub fn find_all<Ex>(
    finder: &mut ActiveFinder<'_>,
    executor: &Ex,
    criteria: &Criteria,
) -> Result<Vec<RecordRef>, FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    finder.clear_records();
    finder.build_query(criteria)?;
    let query = finder.take_query()?;
    let result = finder.run_query(executor, &query, ROOT);
    finder.restore_query(query);
    let rows = result?;
    log::debug!(
        "{} base rows for {} records",
        rows,
        finder.tree.root().records.len()
    );

    let children = finder.tree.root().children.clone();
    for child in children {
        find_node(finder, executor, child)?;
    }
    finder.run_stats(executor, ROOT)?;
    Ok(finder.tree.root().records())
}

/// Resolve the finder's relations for base records fetched elsewhere.
///
/// The records are registered in the root cache as if they had been
/// decoded, then joined relations are loaded with one statement over their
/// keys and the rest as in [`find_all`].
///
/// # Errors
///
/// `MissingAttribute` if a record lacks a primary key column, otherwise the
/// first compilation or execution error.
pub fn find_with_base<Ex>(
    finder: &mut ActiveFinder<'_>,
    executor: &Ex,
    records: &[RecordRef],
) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    for record in records {
        finder.tree.register(ROOT, record)?;
    }

    let policy = JoinPolicy {
        join_all: finder.config.join_all,
        base_limited: false,
    };
    finder.policy = policy;
    finder.tree.reset_joined();
    let mut query = join::range_query(&finder.tree, ROOT, &mut finder.names);
    join::build_children(&mut finder.tree, &mut query, ROOT, policy)?;
    // only the base table: nothing was joined
    if query.joins.len() > 1 {
        finder.run_query(executor, &query, ROOT)?;
    }

    let children = finder.tree.root().children.clone();
    for child in children {
        find_node(finder, executor, child)?;
    }
    finder.run_stats(executor, ROOT)
}

/// Resolve node `id` if the base statement left it out, then its subtree
pub(crate) fn find_node<Ex>(finder: &mut ActiveFinder<'_>, executor: &Ex, id: NodeId) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    let node = finder.tree.node(id);
    if let Some(parent) = node.parent() {
        if !node.is_joined() && !finder.tree.node(parent).records.is_empty() {
            finder.tree.node_mut(id).joined = true;
            let policy = JoinPolicy {
                base_limited: false,
                ..finder.policy
            };
            let mut query = join::range_query(&finder.tree, parent, &mut finder.names);
            join::join_node(&mut finder.tree, &mut query, id)?;
            join::build_children(&mut finder.tree, &mut query, id, policy)?;
            let rows = finder.run_query(executor, &query, parent)?;
            log::trace!("deferred relation {} returned {rows} rows", finder.tree.node(id).name());
        }
    }

    let children = finder.tree.node(id).children.clone();
    for child in children {
        find_node(finder, executor, child)?;
    }
    finder.run_stats(executor, id)
}
