//! Error types for the conversion and synchronization library.

use std::fmt;

use thiserror::Error;

/// A column whose observed values fall outside what its declared type allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeViolation {
    /// Column name.
    pub column: String,
    /// Declared `[min, max]`, rendered as text.
    pub allowed: (String, String),
    /// Observed `[min, max]`, rendered as text.
    pub actual: (String, String),
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: allowed range [{}, {}], actual range [{}, {}]",
            self.column, self.allowed.0, self.allowed.1, self.actual.0, self.actual.1
        )
    }
}

fn typed_list(columns: &[(String, String)]) -> String {
    columns
        .iter()
        .map(|(name, sql_type)| format!("{name} ({sql_type})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn violation_list(violations: &[RangeViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for schema conversion and write operations.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Configuration error (invalid YAML, missing fields, conflicting options)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or statement error
    #[error("Database error: {0}")]
    Database(#[from] tiberius::error::Error),

    /// Introspection of the named table returned no columns
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Required or expected columns absent from the live schema or the in-memory table
    #[error("Columns missing from {table}: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// Column types with no conversion rule
    #[error("Undefined conversion rule for columns: {}", typed_list(.columns))]
    UndefinedConversionRule { columns: Vec<(String, String)> },

    /// Values that cannot be widened or cast to the column's host type
    #[error("Invalid values for columns [{}]: {message}", .columns.join(", "))]
    InvalidColumnValue { columns: Vec<String>, message: String },

    /// Values whose magnitude or length exceed the declared column bounds
    #[error("Insufficient column size: {}", violation_list(.violations))]
    InsufficientColumnSize { violations: Vec<RangeViolation> },

    /// Non-ASCII text targeting a non-unicode character column
    #[error("Non-ASCII values in non-unicode columns: {}", .columns.join(", "))]
    NonUnicodeTypeColumn { columns: Vec<String> },

    /// Time-of-day values outside 00:00:00 to 23:59:59.9999999
    #[error("Values out of range for columns [{}]: {message}", .columns.join(", "))]
    OutOfRange { columns: Vec<String>, message: String },

    /// No match columns given and the table has no primary key
    #[error("Table {0} has no primary key and no match columns were given")]
    UndefinedPrimaryKey(String),

    /// Identifier that cannot be quoted
    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    /// Create a MissingColumns error.
    pub fn missing_columns(table: impl Into<String>, columns: Vec<String>) -> Self {
        FrameError::MissingColumns {
            table: table.into(),
            columns,
        }
    }

    /// Create an InvalidColumnValue error.
    pub fn invalid_value(columns: Vec<String>, message: impl Into<String>) -> Self {
        FrameError::InvalidColumnValue {
            columns,
            message: message.into(),
        }
    }

    /// Whether the error was raised by value validation rather than the database.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FrameError::MissingColumns { .. }
                | FrameError::UndefinedConversionRule { .. }
                | FrameError::InvalidColumnValue { .. }
                | FrameError::InsufficientColumnSize { .. }
                | FrameError::NonUnicodeTypeColumn { .. }
                | FrameError::OutOfRange { .. }
        )
    }

    /// Process exit code for the command line front end.
    pub fn exit_code(&self) -> u8 {
        match self {
            FrameError::Config(_) | FrameError::Yaml(_) | FrameError::Io(_) => 2,
            FrameError::Database(_) => 3,
            FrameError::TableNotFound(_)
            | FrameError::UndefinedPrimaryKey(_)
            | FrameError::InvalidObjectName(_) => 4,
            e if e.is_validation() => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_lists_every_column() {
        let err = FrameError::missing_columns("dbo.users", vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Columns missing from dbo.users: a, b");
    }

    #[test]
    fn test_insufficient_size_reports_ranges() {
        let err = FrameError::InsufficientColumnSize {
            violations: vec![RangeViolation {
                column: "qty".into(),
                allowed: ("0".into(), "255".into()),
                actual: ("1".into(), "100000".into()),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("allowed range [0, 255]"));
        assert!(msg.contains("actual range [1, 100000]"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FrameError::Config("x".into()).exit_code(), 2);
        assert_eq!(FrameError::TableNotFound("t".into()).exit_code(), 4);
        assert_eq!(
            FrameError::NonUnicodeTypeColumn { columns: vec![] }.exit_code(),
            5
        );
    }

    #[test]
    fn test_format_detailed_without_source() {
        let err = FrameError::UndefinedPrimaryKey("dbo.t".into());
        assert!(err.format_detailed().starts_with("Error: Table dbo.t"));
    }
}
