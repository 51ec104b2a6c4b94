//! Row decoding into deduplicated records.

use crate::finder::node::NodeId;
use crate::finder::tree::JoinTree;
use crate::query::join_query::JoinQuery;
use crate::record::{Record, RecordRef};
use crate::relation::identity::KeyValue;
use crate::value::Row;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Decode the part of `row` belonging to node `id` and its joined children.
///
/// Returns `None` when the node's key is absent or NULL, which is how an
/// outer join reports "no related row". A key seen before yields the cached
/// record unchanged.
pub(crate) fn populate_node(
    tree: &mut JoinTree<'_>,
    query: &JoinQuery,
    id: NodeId,
    row: &Row,
) -> Option<RecordRef> {
    let key = tree.node(id).read_key(row)?;
    let cache_key = key.cache_key();

    let record = match tree.node(id).records.get(&cache_key) {
        Some(record) => record.clone(),
        None => {
            let node = tree.node(id);
            let record = Record::new(&node.entity.name, node.decode(row), Some(key.clone())).into_ref();
            tree.init_placeholders(id, &record);
            #[cfg(feature = "metrics")]
            METRICS.record_materialized();
            tree.node_mut(id).records.insert(key, record)
        }
    };

    let children = tree.node(id).children.clone();
    for child in children {
        if !query.elements.contains(&child) {
            continue;
        }
        let (kind, name, index) = match tree.node(child).relation() {
            Some(r) if !r.select.is_empty() => (r.kind, r.name.clone(), r.index.clone()),
            _ => continue,
        };

        let related = populate_node(tree, query, child, row);
        if kind.is_singular() {
            record.borrow_mut().attach_one(&name, related);
            continue;
        }

        let related_key = related
            .as_ref()
            .and_then(|r| r.borrow().key().map(KeyValue::cache_key))
            .unwrap_or_else(|| "0".to_string());
        let first_seen = tree
            .node_mut(id)
            .attached
            .insert((cache_key.clone(), name.clone(), related_key));
        if let (true, Some(related)) = (first_seen, related) {
            record.borrow_mut().attach_many(&name, related, index.as_deref());
        }
    }

    Some(record)
}
