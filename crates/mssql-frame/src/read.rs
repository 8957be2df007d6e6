//! Reading query results into a typed frame.

use tracing::debug;

use crate::core::frame::{Column, Frame};
use crate::core::traits::Session;
use crate::core::value::SqlValue;
use crate::error::{FrameError, Result};
use crate::schema::model::TableSchema;

/// Run `statement` with positional `args` and type its result by `schema`.
///
/// Every result column must be a column of `schema`, and every primary key
/// column of `schema` must be in the result; otherwise this fails with
/// [`FrameError::MissingColumns`]. Each column is converted to its host
/// representation, parsing temporal values returned as text, and the
/// primary key columns become the frame's index.
pub async fn read<S>(
    session: &mut S,
    statement: &str,
    schema: &TableSchema,
    args: &[SqlValue],
) -> Result<Frame>
where
    S: Session + ?Sized,
{
    let result = session.query(statement, args).await?;

    let unknown: Vec<String> = result
        .columns
        .iter()
        .filter(|c| !schema.contains(c))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(FrameError::missing_columns(schema.table.to_string(), unknown));
    }

    let key = schema.primary_key();
    let missing_key: Vec<String> = key
        .iter()
        .filter(|k| !result.columns.contains(k))
        .cloned()
        .collect();
    if !missing_key.is_empty() {
        return Err(FrameError::missing_columns("query result", missing_key));
    }

    let mut columns = Vec::with_capacity(result.columns.len());
    let mut failed = Vec::new();
    let mut first_error = None;
    for (position, name) in result.columns.iter().enumerate() {
        let Some(col_schema) = schema.column(name) else {
            continue;
        };
        let raw = Column::object(
            name.clone(),
            result
                .rows
                .iter()
                .map(|row| row.get(position).cloned().unwrap_or_default())
                .collect(),
        );
        match raw.cast(col_schema.column_type.host_type) {
            Ok(column) => columns.push(column),
            Err(e) => {
                failed.push(name.clone());
                first_error.get_or_insert(e);
            }
        }
    }
    if !failed.is_empty() {
        return Err(FrameError::invalid_value(
            failed,
            first_error.unwrap_or_default(),
        ));
    }

    let mut frame = Frame::new(columns)?;
    if !key.is_empty() {
        frame.set_index(&key)?;
    }

    debug!(
        "Read {} rows and {} columns for {}",
        frame.num_rows(),
        result.columns.len(),
        schema.table
    );
    Ok(frame)
}
