//! Identifier validation, quoting and table name parsing.
//!
//! Identifiers (table and column names) cannot be sent as statement
//! parameters, so anything embedded into SQL text goes through
//! [`quote_mssql`] or [`escape`]. The MERGE builder avoids text embedding
//! altogether and only calls [`validate_identifier`] before binding.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// Longest identifier SQL Server accepts (`sysname`), in characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Catalog holding session temporary tables.
pub const TEMP_CATALOG: &str = "tempdb";

/// Validate an identifier before it is quoted or bound.
///
/// Rejects empty names, names containing null bytes, and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] characters (which `QUOTENAME` turns into NULL).
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FrameError::InvalidObjectName(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(FrameError::InvalidObjectName(format!(
            "identifier contains null byte: {:?}",
            name
        )));
    }

    let length = name.chars().count();
    if length > MAX_IDENTIFIER_LENGTH {
        return Err(FrameError::InvalidObjectName(format!(
            "identifier exceeds maximum length of {} characters (got {}): {:?}",
            MAX_IDENTIFIER_LENGTH, length, name
        )));
    }

    Ok(())
}

/// Quote a SQL Server identifier using brackets.
///
/// Closing brackets are doubled, matching `QUOTENAME`.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Escape a possibly dotted object name part by part.
///
/// `dbo.users` becomes `[dbo].[users]`.
pub fn escape(name: &str) -> Result<String> {
    Ok(name
        .split('.')
        .map(quote_mssql)
        .collect::<Result<Vec<_>>>()?
        .join("."))
}

/// A one- or two-part table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Schema, when the name was qualified.
    pub schema: Option<String>,
    /// Table name. A leading `#` marks a session temporary table.
    pub name: String,
}

impl TableName {
    /// Parse `table` or `schema.table`.
    ///
    /// Surrounding brackets on a part are removed.
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.split('.').map(unbracket).collect();
        let table = match parts.as_slice() {
            [name] => Self {
                schema: None,
                name: name.to_string(),
            },
            [schema, name] => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            _ => {
                return Err(FrameError::InvalidObjectName(format!(
                    "expected table or schema.table, got {:?}",
                    input
                )))
            }
        };

        if let Some(schema) = &table.schema {
            validate_identifier(schema)?;
        }
        validate_identifier(&table.name)?;
        if table.is_temporary() && table.schema.is_some() {
            return Err(FrameError::InvalidObjectName(format!(
                "temporary table cannot be schema qualified: {:?}",
                input
            )));
        }
        Ok(table)
    }

    /// Whether this names a session temporary table.
    pub fn is_temporary(&self) -> bool {
        self.name.starts_with('#')
    }

    /// Catalog to introspect: `tempdb` for temporary tables, otherwise the
    /// connection's current database.
    pub fn catalog(&self) -> Option<&'static str> {
        self.is_temporary().then_some(TEMP_CATALOG)
    }

    /// Bracket-quoted name for embedding in SQL text.
    pub fn quoted(&self) -> Result<String> {
        match &self.schema {
            Some(schema) => Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(&self.name)?)),
            None => quote_mssql(&self.name),
        }
    }

    /// Name to hand to `OBJECT_ID`, resolving temporary tables in tempdb.
    pub fn object_id_name(&self) -> Result<String> {
        if self.is_temporary() {
            Ok(format!("{}..{}", TEMP_CATALOG, quote_mssql(&self.name)?))
        } else {
            self.quoted()
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn unbracket(part: &str) -> &str {
    let trimmed = part.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|p| p.strip_suffix(']'))
        .unwrap_or(trimmed)
}
