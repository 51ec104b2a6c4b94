//! Table and entity descriptors consumed from the schema catalog.
//!
//! The catalog itself lives outside this crate; these are the read-only
//! shapes the join tree needs: column order (which determines column
//! aliases), the primary key and declared foreign key constraints.

use crate::relation::identity::PrimaryKey;
use std::collections::HashMap;

/// Target of a declared foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Column names in declaration order
    pub columns: Vec<String>,
    pub primary_key: PrimaryKey,
    /// Local column → referenced table/column
    pub foreign_keys: HashMap<String, ForeignKeyRef>,
}

impl TableSchema {
    pub fn new(name: &str, columns: &[&str], primary_key: PrimaryKey) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            primary_key,
            foreign_keys: HashMap::new(),
        }
    }

    /// Declare a foreign key constraint `column → table.referenced`
    pub fn with_foreign_key(mut self, column: &str, table: &str, referenced: &str) -> Self {
        self.foreign_keys.insert(
            column.to_string(),
            ForeignKeyRef {
                table: table.to_string(),
                column: referenced.to_string(),
            },
        );
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeyRef> {
        self.foreign_keys.get(column)
    }

    /// Foreign key of `column` if it references `table`
    pub fn foreign_key_to(&self, column: &str, table: &str) -> Option<&ForeignKeyRef> {
        self.foreign_key(column)
            .filter(|fk| compare_table_names(&fk.table, table))
    }

    /// Quoted table name for FROM/JOIN clauses
    pub fn raw_name(&self) -> String {
        quote_table_name(&self.name)
    }
}

/// An entity type: a name bound to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub table: String,
}

impl EntityType {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
        }
    }
}

/// Quote a possibly schema-qualified table name (`public.orders` → `"public"."orders"`)
pub fn quote_table_name(name: &str) -> String {
    name.split('.')
        .map(quote_simple)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote a column name; `*` and already-quoted names pass through
pub fn quote_column_name(name: &str) -> String {
    if name == "*" {
        return name.to_string();
    }
    quote_simple(name)
}

fn quote_simple(name: &str) -> String {
    if name.starts_with('"') {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Whether two table names denote the same table.
///
/// Quotes are ignored, and when only one side is schema-qualified the bare
/// table names are compared.
pub fn compare_table_names(a: &str, b: &str) -> bool {
    let a = a.replace('"', "");
    let b = b.replace('"', "");
    if a.contains('.') == b.contains('.') {
        return a == b;
    }
    let last = |s: &str| s.rsplit('.').next().unwrap_or_default().to_string();
    last(&a) == last(&b)
}
