//! Shared fixtures: an order schema and a scripted executor.
//!
//! Test relationships:
//! - Order belongs_to Customer, has_many Items, many_many Tags (via order_tags)
//! - Order has_many Products through Items, stat itemCount over Items
//! - Item belongs_to Product and Order
//! - OrderLine (composite key) has_many LineNotes

#![allow(dead_code)]

use active_finder::{
    ExecutorError, FinderExecutor, PrimaryKey, RelationDef, Registry, Row, TableSchema,
};
use fake::faker::lorem::en::Word;
use fake::faker::name::en::Name;
use fake::Fake;
use sea_query::Value;
use std::cell::RefCell;
use std::collections::VecDeque;

// ============================================================================
// Scripted executor
// ============================================================================

/// Returns canned result sets in order and records every statement it runs
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: RefCell<VecDeque<Vec<Row>>>,
    statements: RefCell<Vec<(String, Vec<Value>)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the rows returned by the next statement
    pub fn respond(self, rows: Vec<Row>) -> Self {
        self.responses.borrow_mut().push_back(rows);
        self
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.borrow().clone()
    }

    pub fn sql(&self, index: usize) -> String {
        self.statements.borrow()[index].0.clone()
    }

    pub fn params(&self, index: usize) -> Vec<Value> {
        self.statements.borrow()[index].1.clone()
    }
}

impl FinderExecutor for ScriptedExecutor {
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        self.statements
            .borrow_mut()
            .push((sql.to_string(), params.to_vec()));
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Executor whose every statement fails
pub struct FailingExecutor;

impl FinderExecutor for FailingExecutor {
    fn query_all(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        Err(ExecutorError::QueryError("relation \"orders\" does not exist".to_string()))
    }
}

/// Executor that answers the base statement with one order and fails every aggregate
pub struct StatFailingExecutor;

impl FinderExecutor for StatFailingExecutor {
    fn query_all(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        if sql.contains("COUNT(") {
            return Err(ExecutorError::QueryError("canceling statement due to statement timeout".to_string()));
        }
        Ok(vec![order_row(1, 3)])
    }
}

// ============================================================================
// Schema and relations
// ============================================================================

fn pk(column: &str) -> PrimaryKey {
    PrimaryKey::Simple(column.to_string())
}

pub fn registry() -> Registry {
    Registry::new()
        .table(TableSchema::new("orders", &["id", "customer_id", "status"], pk("id")))
        .table(TableSchema::new("customers", &["id", "name"], pk("id")))
        .table(
            TableSchema::new("items", &["id", "order_id", "product_id", "qty"], pk("id"))
                .with_foreign_key("order_id", "orders", "id"),
        )
        .table(TableSchema::new("products", &["id", "title"], pk("id")))
        .table(TableSchema::new("tags", &["id", "label"], pk("id")))
        .table(
            TableSchema::new(
                "order_tags",
                &["order_id", "tag_id"],
                PrimaryKey::composite(&["order_id", "tag_id"]),
            )
            .with_foreign_key("order_id", "orders", "id")
            .with_foreign_key("tag_id", "tags", "id"),
        )
        .table(TableSchema::new(
            "order_lines",
            &["order_id", "line_no", "sku"],
            PrimaryKey::composite(&["order_id", "line_no"]),
        ))
        .table(TableSchema::new(
            "line_notes",
            &["id", "order_id", "line_no", "body"],
            pk("id"),
        ))
        .entity("Order", "orders")
        .entity("Customer", "customers")
        .entity("Item", "items")
        .entity("Product", "products")
        .entity("Tag", "tags")
        .entity("OrderLine", "order_lines")
        .entity("LineNote", "line_notes")
        .relation("Order", RelationDef::belongs_to("customer", "Customer", "customer_id"))
        .relation("Order", RelationDef::has_many("items", "Item", "order_id"))
        .relation(
            "Order",
            RelationDef::many_many("tags", "Tag", "order_tags(order_id, tag_id)"),
        )
        .relation(
            "Order",
            RelationDef::many_many("badTags", "Tag", "order_tags(order_id)"),
        )
        .relation(
            "Order",
            RelationDef::has_many("products", "Product", "product_id").through("items"),
        )
        .relation("Order", RelationDef::stat("itemCount", "Item", "order_id"))
        .relation("Item", RelationDef::belongs_to("product", "Product", "product_id"))
        .relation("Item", RelationDef::belongs_to("order", "Order", "order_id"))
        .relation("OrderLine", RelationDef::has_many("notes", "LineNote", "order_id, line_no"))
}

// ============================================================================
// Row builders (column aliases follow node id and column position)
// ============================================================================

pub fn order_row(id: i32, customer_id: i32) -> Row {
    Row::new()
        .with("t0_c0", id)
        .with("t0_c1", customer_id)
        .with("t0_c2", "paid")
}

/// Item columns for node `node`
pub fn item_cols(row: Row, node: usize, id: i32, order_id: i32, product_id: i32) -> Row {
    let qty: i32 = (1..10).fake();
    row.with(&format!("t{node}_c0"), id)
        .with(&format!("t{node}_c1"), order_id)
        .with(&format!("t{node}_c2"), product_id)
        .with(&format!("t{node}_c3"), qty)
}

/// Outer join miss for a four-column node
pub fn null_cols(row: Row, node: usize, columns: usize) -> Row {
    (0..columns).fold(row, |row, c| {
        row.with(&format!("t{node}_c{c}"), Value::Int(None))
    })
}

pub fn product_cols(row: Row, node: usize, id: i32) -> Row {
    let title: String = Word().fake();
    row.with(&format!("t{node}_c0"), id)
        .with(&format!("t{node}_c1"), title)
}

pub fn customer_cols(row: Row, node: usize, id: i32) -> Row {
    let name: String = Name().fake();
    row.with(&format!("t{node}_c0"), id)
        .with(&format!("t{node}_c1"), name)
}

pub fn tag_cols(row: Row, node: usize, id: i32, label: &str) -> Row {
    row.with(&format!("t{node}_c0"), id)
        .with(&format!("t{node}_c1"), label)
}

pub fn int(v: i32) -> Value {
    Value::Int(Some(v))
}
