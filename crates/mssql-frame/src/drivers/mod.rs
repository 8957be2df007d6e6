//! Database driver implementations.
//!
//! - [`mssql`]: Microsoft SQL Server over tiberius
//!
//! Each driver implements [`crate::core::traits::Session`].

pub mod mssql;

pub use mssql::MssqlSession;
