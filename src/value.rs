//! Row and value utilities.
//!
//! Result rows are ordered `name → sea_query::Value` mappings. This module
//! also owns the stable key encoding used by record caches, the conversion
//! of bound parameters into `may_postgres` `ToSql` objects and the decoding
//! of `may_postgres` rows into [`Row`].

use crate::executor::ExecutorError;
use may_postgres::types::{ToSql, Type};
use sea_query::Value;

/// One result row: column alias → value, in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style insert, mostly useful for scripted executors and tests
    pub fn with<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.push(name, value.into());
        self
    }

    /// Set `name` to `value`, replacing an existing column of the same name
    pub fn push(&mut self, name: &str, value: Value) {
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value of `name` unless it is absent or SQL NULL
    pub fn get_present(&self, name: &str) -> Option<&Value> {
        self.get(name).filter(|v| !is_null(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// First column's value, used for scalar results such as counts
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.push(&name, value);
        }
        row
    }
}

/// Whether the value is SQL NULL
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
    )
}

/// Encode a value as a self-delimiting, type-tagged cache key fragment.
///
/// All integer widths share the `i` tag so that a key decoded from an
/// `INT4` column matches the same key read back from a record attribute
/// that was bound as `INT8`. Strings carry their length so that
/// concatenated fragments of a composite key can never collide.
pub fn encode_key(value: &Value) -> String {
    match value {
        Value::Bool(Some(b)) => format!("b:{};", u8::from(*b)),
        Value::TinyInt(Some(i)) => format!("i:{i};"),
        Value::SmallInt(Some(i)) => format!("i:{i};"),
        Value::Int(Some(i)) => format!("i:{i};"),
        Value::BigInt(Some(i)) => format!("i:{i};"),
        Value::TinyUnsigned(Some(u)) => format!("i:{u};"),
        Value::SmallUnsigned(Some(u)) => format!("i:{u};"),
        Value::Unsigned(Some(u)) => format!("i:{u};"),
        Value::BigUnsigned(Some(u)) => format!("i:{u};"),
        Value::Float(Some(f)) => format!("f:{f};"),
        Value::Double(Some(d)) => format!("f:{d};"),
        Value::String(Some(s)) => format!("s:{}:{s};", s.len()),
        Value::Char(Some(c)) => {
            let s = c.to_string();
            format!("s:{}:{s};", s.len())
        }
        Value::Bytes(Some(b)) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("x:{hex};")
        }
        Value::Json(Some(j)) => {
            let s = j.to_string();
            format!("j:{}:{s};", s.len())
        }
        v if is_null(v) => "n;".to_string(),
        other => {
            let s = format!("{other:?}");
            format!("?:{}:{s};", s.len())
        }
    }
}

/// Plain textual rendering of a value (index keys, string-typed counts)
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Bool(Some(b)) => b.to_string(),
        Value::TinyInt(Some(i)) => i.to_string(),
        Value::SmallInt(Some(i)) => i.to_string(),
        Value::Int(Some(i)) => i.to_string(),
        Value::BigInt(Some(i)) => i.to_string(),
        Value::TinyUnsigned(Some(u)) => u.to_string(),
        Value::SmallUnsigned(Some(u)) => u.to_string(),
        Value::Unsigned(Some(u)) => u.to_string(),
        Value::BigUnsigned(Some(u)) => u.to_string(),
        Value::Float(Some(f)) => f.to_string(),
        Value::Double(Some(d)) => d.to_string(),
        Value::String(Some(s)) => s.clone(),
        Value::Char(Some(c)) => c.to_string(),
        Value::Bytes(Some(b)) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        Value::Json(Some(j)) => j.to_string(),
        v if is_null(v) => String::new(),
        other => format!("{other:?}"),
    }
}

/// Convert bound values to `may_postgres` `ToSql` parameters and run `f` with them.
///
/// Values are first collected into typed vectors, then references into those
/// vectors are handed to the closure, so the references stay valid for the
/// whole call.
///
/// # Errors
///
/// Returns `ExecutorError::Other` for value types that have no Postgres binding.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, ExecutorError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, ExecutorError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut bytes: Vec<Vec<u8>> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();
    let mut floats: Vec<f32> = Vec::new();
    let mut doubles: Vec<f64> = Vec::new();

    for value in values {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::TinyInt(Some(i)) => ints.push(i32::from(*i)),
            Value::SmallInt(Some(i)) => ints.push(i32::from(*i)),
            Value::Int(Some(i)) => ints.push(*i),
            Value::TinyUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::SmallUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::Unsigned(Some(u)) => big_ints.push(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => {
                let v = i64::try_from(*u).map_err(|_| {
                    ExecutorError::Other(format!(
                        "BigUnsigned value {u} exceeds i64::MAX and cannot be bound"
                    ))
                })?;
                big_ints.push(v);
            }
            Value::Float(Some(f)) => floats.push(*f),
            Value::Double(Some(d)) => doubles.push(*d),
            Value::String(Some(s)) => strings.push(s.clone()),
            Value::Char(Some(c)) => strings.push(c.to_string()),
            Value::Bytes(Some(b)) => bytes.push(b.clone()),
            Value::Json(Some(j)) => strings.push(j.to_string()),
            v if is_null(v) => nulls.push(None),
            other => {
                return Err(ExecutorError::Other(format!(
                    "Unsupported value type in query: {other:?}"
                )))
            }
        }
    }

    let (mut bool_idx, mut int_idx, mut big_int_idx, mut string_idx) = (0, 0, 0, 0);
    let (mut byte_idx, mut null_idx, mut float_idx, mut double_idx) = (0, 0, 0, 0);
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx]);
                bool_idx += 1;
            }
            Value::TinyInt(Some(_))
            | Value::SmallInt(Some(_))
            | Value::Int(Some(_))
            | Value::TinyUnsigned(Some(_))
            | Value::SmallUnsigned(Some(_)) => {
                params.push(&ints[int_idx]);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) | Value::Unsigned(Some(_)) | Value::BigUnsigned(Some(_)) => {
                params.push(&big_ints[big_int_idx]);
                big_int_idx += 1;
            }
            Value::Float(Some(_)) => {
                params.push(&floats[float_idx]);
                float_idx += 1;
            }
            Value::Double(Some(_)) => {
                params.push(&doubles[double_idx]);
                double_idx += 1;
            }
            Value::String(Some(_)) | Value::Char(Some(_)) | Value::Json(Some(_)) => {
                params.push(&strings[string_idx]);
                string_idx += 1;
            }
            Value::Bytes(Some(_)) => {
                params.push(&bytes[byte_idx]);
                byte_idx += 1;
            }
            _ => {
                params.push(&nulls[null_idx]);
                null_idx += 1;
            }
        }
    }

    f(&params)
}

/// Decode a `may_postgres` row into a [`Row`] keyed by column name.
///
/// # Errors
///
/// Returns `ExecutorError::ParseError` for column types without a decoding.
pub fn row_from_postgres(row: &may_postgres::Row) -> Result<Row, ExecutorError> {
    let mut out = Row::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            Value::Bool(row.try_get(idx)?)
        } else if *ty == Type::INT2 {
            Value::SmallInt(row.try_get(idx)?)
        } else if *ty == Type::INT4 {
            Value::Int(row.try_get(idx)?)
        } else if *ty == Type::INT8 {
            Value::BigInt(row.try_get(idx)?)
        } else if *ty == Type::FLOAT4 {
            Value::Float(row.try_get(idx)?)
        } else if *ty == Type::FLOAT8 {
            Value::Double(row.try_get(idx)?)
        } else if *ty == Type::NUMERIC {
            let d: Option<rust_decimal::Decimal> = row.try_get(idx)?;
            Value::String(d.map(|d| d.to_string()))
        } else if *ty == Type::BYTEA {
            Value::Bytes(row.try_get(idx)?)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            let j: Option<serde_json::Value> = row.try_get(idx)?;
            Value::Json(j.map(Box::new))
        } else if *ty == Type::DATE {
            let d: Option<chrono::NaiveDate> = row.try_get(idx)?;
            Value::String(d.map(|d| d.to_string()))
        } else if *ty == Type::TIMESTAMP {
            let t: Option<chrono::NaiveDateTime> = row.try_get(idx)?;
            Value::String(t.map(|t| t.to_string()))
        } else if *ty == Type::TIMESTAMPTZ {
            let t: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            Value::String(t.map(|t| t.to_rfc3339()))
        } else {
            let s: Option<String> = row.try_get(idx).map_err(|e| {
                ExecutorError::ParseError(format!(
                    "Cannot decode column \"{}\" of type {}: {e}",
                    column.name(),
                    ty
                ))
            })?;
            Value::String(s)
        };
        out.push(column.name(), value);
    }
    Ok(out)
}
