//! Core value, table and session types.
//!
//! - [`value`]: cell values and host representations
//! - [`frame`]: the in-memory typed table
//! - [`identifier`]: identifier validation, quoting and table names
//! - [`traits`]: the database session abstraction

pub mod frame;
pub mod identifier;
pub mod traits;
pub mod value;

pub use frame::{Column, Frame};
pub use identifier::{escape, quote_mssql, validate_identifier, TableName};
pub use traits::{ColumnRow, PrimaryKeyRow, ResultSet, Session};
pub use value::{DataType, SqlValue};
