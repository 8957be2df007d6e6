//! Table schema introspection.

use tracing::debug;

use super::coerce::coerce;
use super::model::{ColumnSchema, TableSchema};
use super::registry::lookup;
use crate::core::frame::Frame;
use crate::core::identifier::TableName;
use crate::core::traits::Session;
use crate::error::{FrameError, Result};

const IDENTITY_SUFFIX: &str = " identity";

/// Strip the identity marker so identity columns share their base type's rule.
fn base_type(sql_type: &str) -> &str {
    let trimmed = sql_type.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.ends_with(IDENTITY_SUFFIX) {
        trimmed[..trimmed.len() - IDENTITY_SUFFIX.len()].trim_end()
    } else {
        trimmed
    }
}

/// Introspect a table's columns and primary key.
///
/// Fails with [`FrameError::TableNotFound`] when the table has no columns,
/// [`FrameError::MissingColumns`] when any of `required_columns` is absent,
/// and [`FrameError::UndefinedConversionRule`] listing every column whose
/// type has no conversion rule.
pub async fn describe_schema<S, C>(
    session: &mut S,
    table_name: &str,
    required_columns: &[C],
) -> Result<TableSchema>
where
    S: Session + ?Sized,
    C: AsRef<str>,
{
    introspect(session, table_name, required_columns, None).await
}

/// Introspect a table and coerce `frame` to it.
///
/// In addition to the checks of [`describe_schema`], every column of `frame`
/// (index included) must exist in the table.
pub async fn describe_frame<S, C>(
    session: &mut S,
    table_name: &str,
    frame: Frame,
    required_columns: &[C],
) -> Result<(TableSchema, Frame)>
where
    S: Session + ?Sized,
    C: AsRef<str>,
{
    let names = frame.all_names();
    let schema = introspect(session, table_name, required_columns, Some(&names)).await?;
    let frame = coerce(&schema, frame)?;
    Ok((schema, frame))
}

async fn introspect<S, C>(
    session: &mut S,
    table_name: &str,
    required_columns: &[C],
    frame_columns: Option<&[String]>,
) -> Result<TableSchema>
where
    S: Session + ?Sized,
    C: AsRef<str>,
{
    let table = TableName::parse(table_name)?;

    let rows = session.introspect_columns(&table).await?;
    if rows.is_empty() {
        return Err(FrameError::TableNotFound(table.to_string()));
    }

    let has = |name: &str| rows.iter().any(|r| r.name == name);

    let missing_required: Vec<String> = required_columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !has(c))
        .map(str::to_string)
        .collect();
    if !missing_required.is_empty() {
        return Err(FrameError::missing_columns(table.to_string(), missing_required));
    }

    if let Some(names) = frame_columns {
        let missing: Vec<String> = names.iter().filter(|c| !has(c)).cloned().collect();
        if !missing.is_empty() {
            return Err(FrameError::missing_columns(table.to_string(), missing));
        }
    }

    let keys = session.introspect_primary_key(&table).await?;

    let mut columns = Vec::with_capacity(rows.len());
    let mut undefined = Vec::new();
    for row in rows {
        let base = base_type(&row.type_name);
        let Some(column_type) = lookup(base) else {
            undefined.push((row.name, row.type_name));
            continue;
        };
        let key = keys.iter().find(|k| k.column == row.name);
        columns.push(ColumnSchema {
            is_identity: base.len() != row.type_name.trim().len(),
            primary_key_sequence: key.map(|k| k.key_seq),
            primary_key_name: key.map(|k| k.constraint_name.clone()),
            name: row.name,
            sql_type: row.type_name,
            declared_size: row.column_size,
            decimal_digits: row.decimal_digits,
            is_nullable: row.is_nullable,
            column_type,
        });
    }

    if !undefined.is_empty() {
        return Err(FrameError::UndefinedConversionRule { columns: undefined });
    }

    let schema = TableSchema { table, columns };
    debug!(
        "Described {}: {} columns, primary key [{}]",
        schema.table,
        schema.columns.len(),
        schema.primary_key().join(", ")
    );
    Ok(schema)
}
