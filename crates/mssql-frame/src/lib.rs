//! # mssql-frame
//!
//! Schema-driven conversion between in-memory tables and SQL Server.
//!
//! Every write describes the target table first and validates the frame
//! against it before anything is sent:
//!
//! - **Coercion** of each column to the host type the table's SQL type maps to
//! - **Range checks** for magnitudes, lengths and non-unicode text
//! - **Precision rounding** to what the engine stores, with warnings
//! - **MERGE synchronization** through a staging table with bound identifiers
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_frame::{merge, Column, Config, DataType, Frame, MergeOptions, MssqlSession};
//!
//! #[tokio::main]
//! async fn main() -> mssql_frame::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut session = MssqlSession::connect(&config.connection).await?;
//!
//!     let frame = Frame::new(vec![
//!         Column::from_values("id", DataType::Int32, [1i32, 2])?,
//!         Column::from_values("name", DataType::String, ["a", "b"])?,
//!     ])?;
//!     let outcome = merge(&mut session, "dbo.items", frame, &MergeOptions::default()).await?;
//!     println!("{} rows affected", outcome.rows_affected);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod read;
pub mod schema;
pub mod write;

// Re-exports for convenient access
pub use crate::core::{Column, DataType, Frame, Session, SqlValue, TableName};
pub use config::{Config, ConnectionConfig, WriteConfig};
pub use drivers::MssqlSession;
pub use error::{FrameError, RangeViolation, Result};
pub use read::read;
pub use schema::{describe_frame, describe_schema, PrecisionWarning, TableSchema};
pub use write::{insert, merge, update, MergeOptions, WriteOptions, WriteOutcome};
