//! Schema-driven conversion.
//!
//! [`registry`] holds the per-type conversion rules, [`catalog`] reads a
//! table's layout from the database, [`coerce`] validates and converts an
//! in-memory table against it, and [`precision`] rounds values to what the
//! engine stores.

pub mod catalog;
pub mod coerce;
pub mod model;
pub mod precision;
pub mod registry;

pub use catalog::{describe_frame, describe_schema};
pub use coerce::coerce;
pub use model::{ColumnSchema, TableSchema};
pub use precision::{prepare, Adjusted, Prepared, PrecisionWarning};
pub use registry::{lookup, Category, ColumnType, Rounding, WireType, SUPPORTED_TYPES};
