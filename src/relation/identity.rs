//! Primary key shapes and key values.
//!
//! `PrimaryKey` describes which columns identify a row; `KeyValue` is the
//! matching value carried through record caches. Composite keys keep their
//! column order so the serialized cache key is stable.

use crate::value::{encode_key, is_null};
use sea_query::Value;

/// Primary key of a table: one column, or an ordered list of columns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKey {
    Simple(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn composite(columns: &[&str]) -> Self {
        Self::Composite(columns.iter().map(|c| (*c).to_string()).collect())
    }

    /// Column names in key order
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Simple(c) => vec![c.as_str()],
            Self::Composite(cols) => cols.iter().map(String::as_str).collect(),
        }
    }

    /// Number of key columns
    pub fn arity(&self) -> usize {
        match self {
            Self::Simple(_) => 1,
            Self::Composite(cols) => cols.len(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Column at position `i`; a simple key answers for every position
    pub fn column_at(&self, i: usize) -> Option<&str> {
        match self {
            Self::Simple(c) => Some(c.as_str()),
            Self::Composite(cols) => cols.get(i).map(String::as_str),
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Build the key value from a lookup, `None` if any part is absent or NULL
    pub fn value_from<'v, F>(&self, mut lookup: F) -> Option<KeyValue>
    where
        F: FnMut(&str) -> Option<&'v Value>,
    {
        match self {
            Self::Simple(c) => lookup(c)
                .filter(|v| !is_null(v))
                .map(|v| KeyValue::Scalar(v.clone())),
            Self::Composite(cols) => {
                let mut parts = Vec::with_capacity(cols.len());
                for c in cols {
                    let v = lookup(c).filter(|v| !is_null(v))?;
                    parts.push((c.clone(), v.clone()));
                }
                Some(KeyValue::Composite(parts))
            }
        }
    }
}

/// A concrete primary key value
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Scalar(Value),
    /// Column → value, in primary key order
    Composite(Vec<(String, Value)>),
}

impl KeyValue {
    /// Stable, order-preserving serialization used as cache key
    pub fn cache_key(&self) -> String {
        match self {
            Self::Scalar(v) => encode_key(v),
            Self::Composite(parts) => {
                let mut key = String::from("(");
                for (_, v) in parts {
                    key.push_str(&encode_key(v));
                }
                key.push(')');
                key
            }
        }
    }

    /// Values in key order
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::Composite(parts) => parts.iter().map(|(_, v)| v).collect(),
        }
    }

    /// Value of a named key column; a scalar key answers for any name
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Composite(parts) => parts.iter().find(|(c, _)| c == column).map(|(_, v)| v),
        }
    }
}
