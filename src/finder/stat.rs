//! Statistical (Stat) relations.
//!
//! A stat relation never joins into the main statement. Once its parent
//! records are known, one grouped query computes the aggregate for all of
//! them and every parent gets either its value or the declared default.

use crate::error::FinderError;
use crate::executor::FinderExecutor;
use crate::finder::join::{one_many_pairs, ParamNames};
use crate::finder::node::{key_range, NodeId};
use crate::finder::tree::JoinTree;
use crate::query::join_query::placeholder;
use crate::query::statement::Statement;
use crate::record::Related;
use crate::relation::identity::KeyValue;
use crate::schema::quote_column_name;
use sea_query::Value;
use std::collections::HashMap;

/// Run every stat relation hanging off node `id`
pub(crate) fn run_stats<Ex>(
    tree: &JoinTree<'_>,
    executor: &Ex,
    id: NodeId,
    names: &mut ParamNames,
) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    for &stat in tree.node(id).stats() {
        query_stat(tree, executor, stat, names)?;
    }
    Ok(())
}

/// Grouped aggregate statement for stat node `id`, or `None` without parent records
pub(crate) fn stat_statement(
    tree: &JoinTree<'_>,
    id: NodeId,
    names: &mut ParamNames,
) -> Result<Option<Statement>, FinderError> {
    let node = tree.node(id);
    let (Some(relation), Some(parent)) = (node.relation(), node.parent()) else {
        return Ok(None);
    };
    let parent = tree.node(parent);
    if parent.records.is_empty() {
        return Ok(None);
    }

    let incomplete = || FinderError::IncompleteForeignKey {
        entity: parent.entity.name.clone(),
        relation: relation.name.clone(),
    };
    let pairs = one_many_pairs(
        node,
        parent,
        &relation.foreign_key,
        &parent.entity.name,
        &relation.name,
    )?;
    let pk_columns = parent.table.primary_key.columns();
    if pairs.len() != pk_columns.len() {
        return Err(incomplete());
    }
    // foreign key columns in parent key order
    let mut fk_columns = Vec::with_capacity(pk_columns.len());
    for pk in &pk_columns {
        let fk = pairs
            .iter()
            .find(|(_, p)| p == pk)
            .map(|(f, _)| f.as_str())
            .ok_or_else(incomplete)?;
        fk_columns.push(fk);
    }

    let prefix = node.column_prefix();
    let group_columns: Vec<String> = fk_columns
        .iter()
        .map(|fk| format!("{prefix}{}", quote_column_name(fk)))
        .collect();
    let selects: Vec<String> = group_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} AS {}", quote_column_name(&format!("c{i}"))))
        .collect();
    let (range, range_params) = key_range(
        &prefix,
        &fk_columns,
        parent.records.entries().iter().map(|(k, _)| k.values()),
        &mut || names.next(),
    );

    let mut sql = format!(
        "SELECT {}, {} AS {} FROM {}",
        selects.join(", "),
        relation.stat_select,
        quote_column_name("s"),
        node.table_with_alias()
    );
    if !relation.join.trim().is_empty() {
        sql.push(' ');
        sql.push_str(relation.join.trim());
    }
    sql.push_str(" WHERE ");
    if !relation.condition.trim().is_empty() {
        sql.push_str(&format!("({}) AND ", relation.condition));
    }
    sql.push_str(&format!("({range}) GROUP BY {}", group_columns.join(", ")));
    if !relation.group.trim().is_empty() {
        sql.push_str(&format!(", {}", relation.group));
    }
    if !relation.having.trim().is_empty() {
        sql.push_str(&format!(" HAVING ({})", relation.having));
    }
    if !relation.order.trim().is_empty() {
        sql.push_str(&format!(" ORDER BY {}", relation.order));
    }

    let mut params: Vec<(String, Value)> = relation
        .params
        .iter()
        .map(|(name, value)| (placeholder(name), value.clone()))
        .collect();
    params.extend(range_params);
    Ok(Some(Statement::new(sql, params)))
}

fn query_stat<Ex>(
    tree: &JoinTree<'_>,
    executor: &Ex,
    id: NodeId,
    names: &mut ParamNames,
) -> Result<(), FinderError>
where
    Ex: FinderExecutor + ?Sized,
{
    let Some(statement) = stat_statement(tree, id, names)? else {
        return Ok(());
    };
    let node = tree.node(id);
    let (Some(relation), Some(parent)) = (node.relation(), node.parent()) else {
        return Ok(());
    };
    let parent = tree.node(parent);
    let pk = &parent.table.primary_key;

    let (sql, values) = statement.to_positional();
    log::debug!("stat {} ({} params): {sql}", relation.name, values.len());
    let rows = executor.query_all(&sql, &values)?;

    let mut aggregates: HashMap<String, Value> = HashMap::with_capacity(rows.len());
    for row in &rows {
        let key = if pk.is_composite() {
            pk.columns()
                .iter()
                .enumerate()
                .map(|(i, c)| row.get(&format!("c{i}")).map(|v| ((*c).to_string(), v.clone())))
                .collect::<Option<Vec<_>>>()
                .map(KeyValue::Composite)
        } else {
            row.get("c0").cloned().map(KeyValue::Scalar)
        };
        if let (Some(key), Some(value)) = (key, row.get("s")) {
            aggregates.insert(key.cache_key(), value.clone());
        }
    }

    for (key, record) in parent.records.entries() {
        let value = aggregates
            .get(&key.cache_key())
            .cloned()
            .unwrap_or_else(|| relation.stat_default.clone());
        record
            .borrow_mut()
            .set_related(&relation.name, Related::Stat(value));
    }
    Ok(())
}
