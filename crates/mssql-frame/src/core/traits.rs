//! Database session abstraction.
//!
//! Every operation in this crate talks to the database through [`Session`].
//! [`crate::drivers::mssql::MssqlSession`] implements it over tiberius; tests
//! substitute an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::identifier::TableName;
use super::value::SqlValue;
use crate::error::Result;

/// One column as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    pub name: String,
    /// Engine type name; identity columns carry an ` identity` suffix
    /// (`int identity`).
    pub type_name: String,
    /// Character length for string types (`-1` for max), precision for
    /// decimals, otherwise the storage size.
    pub column_size: i32,
    /// Scale for decimals and fractional-second digits for temporals.
    pub decimal_digits: i32,
    pub is_nullable: bool,
}

/// One primary key column as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyRow {
    pub column: String,
    /// 1-based position in the key.
    pub key_seq: i32,
    pub constraint_name: String,
}

/// Rows returned by a query, with column names in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// A single database session.
///
/// Statements are executed one at a time; `&mut self` keeps a session from
/// being shared by concurrent call chains.
#[async_trait]
pub trait Session: Send {
    /// Columns of `table` in ordinal order. Empty when the table does not exist.
    async fn introspect_columns(&mut self, table: &TableName) -> Result<Vec<ColumnRow>>;

    /// Primary key columns of `table`. Empty when there is no primary key.
    async fn introspect_primary_key(&mut self, table: &TableName) -> Result<Vec<PrimaryKeyRow>>;

    /// Execute a parameterized statement (`@P1`, `@P2`, ...), returning rows affected.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Execute an unparameterized batch at session scope.
    ///
    /// Temporary tables created here outlive the batch, unlike those created
    /// by a parameterized statement.
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Run a parameterized query and collect its first result set.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet>;

    /// Commit pending writes.
    async fn commit(&mut self) -> Result<()>;

    /// Discard pending writes.
    async fn rollback(&mut self) -> Result<()>;
}
