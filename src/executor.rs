//! Statement execution.
//!
//! The finder never talks to a database directly; it hands parameterized SQL
//! to a [`FinderExecutor`] and consumes the rows it yields. `MayPostgresExecutor`
//! is the production implementation over `may_postgres`.

use crate::config::DatabaseConfig;
use crate::connection::{connect, ConnectionError};
use crate::value::{row_from_postgres, with_converted_params, Row};
use may_postgres::{Client, Error as PostgresError};
use sea_query::Value;
use std::fmt;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Executor error type
#[derive(Debug)]
pub enum ExecutorError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            ExecutorError::QueryError(s) => write!(f, "Query error: {s}"),
            ExecutorError::ParseError(s) => write!(f, "Parse error: {s}"),
            ExecutorError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<PostgresError> for ExecutorError {
    fn from(err: PostgresError) -> Self {
        ExecutorError::PostgresError(err)
    }
}

/// The SQL executing primitive consumed by the finder.
///
/// Statements use Postgres positional placeholders (`$1`, `$2`, ...) and the
/// parameters are passed in placeholder order. Rows come back as ordered
/// `alias → value` mappings.
pub trait FinderExecutor {
    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the query execution fails.
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError>;

    /// Execute a query and hand each row to `f` as it is read.
    ///
    /// Returning `Ok(false)` from `f` stops the iteration early. The default
    /// implementation reads the full result first; executors with a cursor
    /// should override it.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the query fails or `f` fails.
    fn for_each_row(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(Row) -> Result<bool, ExecutorError>,
    ) -> Result<(), ExecutorError> {
        for row in self.query_all(sql, params)? {
            if !f(row)? {
                break;
            }
        }
        Ok(())
    }

    /// Execute a query and return the first column of the first row
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::QueryError` if the query returns no rows.
    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Value, ExecutorError> {
        let rows = self.query_all(sql, params)?;
        rows.first()
            .and_then(Row::first)
            .cloned()
            .ok_or_else(|| ExecutorError::QueryError("Scalar query returned no rows".to_string()))
    }
}

impl<T: FinderExecutor + ?Sized> FinderExecutor for &T {
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        (**self).query_all(sql, params)
    }

    fn for_each_row(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(Row) -> Result<bool, ExecutorError>,
    ) -> Result<(), ExecutorError> {
        (**self).for_each_row(sql, params, f)
    }

    fn query_scalar(&self, sql: &str, params: &[Value]) -> Result<Value, ExecutorError> {
        (**self).query_scalar(sql, params)
    }
}

/// Implementation of `FinderExecutor` for `may_postgres::Client`
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    /// Create a new executor from a `may_postgres::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the `[database]` configuration section
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the URL is invalid or the server is unreachable.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        connect(&config.url).map(Self::new)
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl FinderExecutor for MayPostgresExecutor {
    fn query_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        let start = Instant::now();
        let result = with_converted_params(params, |converted| {
            self.client.query(sql, converted).map_err(|e| {
                #[cfg(feature = "metrics")]
                METRICS.record_query_error();
                ExecutorError::PostgresError(e)
            })
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(duration);
        log::trace!("statement finished in {duration:?}");

        result?.iter().map(row_from_postgres).collect()
    }
}
