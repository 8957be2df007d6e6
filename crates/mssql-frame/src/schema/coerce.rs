//! Coercion of an in-memory table to a table schema.
//!
//! [`coerce`] runs the checks in a fixed order and only touches the frame
//! once every check has passed:
//!
//! 1. flatten the key index into ordinary columns
//! 2. widen untyped columns to their category's widest representation
//! 3. check magnitudes against column bounds and text against declared lengths
//! 4. reject non-ASCII text bound for non-unicode columns
//! 5. reject NULLs in non-nullable columns
//! 6. cast to each column's host representation
//! 7. reinstall the primary key columns as the index

use std::cmp::Ordering;

use super::model::{ColumnSchema, TableSchema};
use super::registry::{Category, Rounding};
use crate::core::frame::{Column, Frame};
use crate::core::value::{DataType, SqlValue};
use crate::error::{FrameError, RangeViolation, Result};

/// Coerce `frame` so every column present in `schema` holds valid values of
/// the column's host representation.
///
/// Columns absent from `schema` pass through untouched. On error the frame
/// is dropped.
pub fn coerce(schema: &TableSchema, mut frame: Frame) -> Result<Frame> {
    frame.reset_index();

    let targets: Vec<(&ColumnSchema, &Column)> = frame
        .columns()
        .iter()
        .filter_map(|col| schema.column(col.name()).map(|s| (s, col)))
        .collect();

    let widened = widen(&targets)?;
    let pairs: Vec<(&ColumnSchema, &Column)> = targets
        .iter()
        .map(|(s, _)| *s)
        .zip(widened.iter())
        .collect();

    check_size(&pairs)?;
    check_unicode(&pairs)?;
    check_nullability(&pairs)?;
    let cast = final_cast(&pairs)?;

    for column in cast {
        frame.replace_column(column)?;
    }

    let key: Vec<String> = schema
        .primary_key()
        .into_iter()
        .filter(|name| frame.contains(name))
        .collect();
    if !key.is_empty() {
        frame.set_index(&key)?;
    }

    Ok(frame)
}

/// Widen untyped columns; typed columns are carried as they are.
fn widen(targets: &[(&ColumnSchema, &Column)]) -> Result<Vec<Column>> {
    let mut out = Vec::with_capacity(targets.len());
    let mut failed = Vec::new();
    let mut first_error = None;

    for (schema, column) in targets {
        if column.dtype() != DataType::Object {
            out.push((*column).clone());
            continue;
        }
        match column.cast(schema.column_type.widening_type()) {
            Ok(widened) => out.push(widened),
            Err(e) => {
                failed.push(column.name().to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    if failed.is_empty() {
        Ok(out)
    } else {
        Err(FrameError::invalid_value(
            failed,
            first_error.unwrap_or_default(),
        ))
    }
}

/// Text as the engine will store it, for length and encoding checks.
fn text_of(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Length in the units the engine counts: UTF-16 code units for unicode
/// types, characters otherwise.
fn stored_length(schema: &ColumnSchema, text: &str) -> usize {
    if schema.column_type.is_non_unicode() {
        text.chars().count()
    } else {
        text.encode_utf16().count()
    }
}

fn min_max<'a>(values: impl Iterator<Item = &'a SqlValue>) -> Option<Option<(&'a SqlValue, &'a SqlValue)>> {
    let mut range: Option<(&SqlValue, &SqlValue)> = None;
    for value in values.filter(|v| !v.is_null()) {
        range = Some(match range {
            None => (value, value),
            Some((lo, hi)) => {
                let lo = match value.compare(lo)? {
                    Ordering::Less => value,
                    _ => lo,
                };
                let hi = match value.compare(hi)? {
                    Ordering::Greater => value,
                    _ => hi,
                };
                (lo, hi)
            }
        });
    }
    Some(range)
}

fn render_bound(bound: &Option<SqlValue>, unbounded: &str) -> String {
    bound
        .as_ref()
        .map_or_else(|| unbounded.to_string(), ToString::to_string)
}

fn check_size(pairs: &[(&ColumnSchema, &Column)]) -> Result<()> {
    let mut violations = Vec::new();
    let mut time_violations = Vec::new();
    let mut incomparable = Vec::new();

    for (schema, column) in pairs {
        if schema.is_character() {
            let lengths: Vec<usize> = column
                .values()
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| stored_length(schema, &text_of(v)))
                .collect();
            let (Some(max_len), Some(lo), Some(hi)) = (
                schema.max_length(),
                lengths.iter().min(),
                lengths.iter().max(),
            ) else {
                continue;
            };
            if *hi > max_len {
                violations.push(RangeViolation {
                    column: schema.name.clone(),
                    allowed: ("0".to_string(), max_len.to_string()),
                    actual: (lo.to_string(), hi.to_string()),
                });
            }
            continue;
        }

        let (min_bound, max_bound) = schema.bounds();
        if min_bound.is_none() && max_bound.is_none() {
            continue;
        }
        let Some(range) = min_max(column.values().iter()) else {
            incomparable.push(schema.name.clone());
            continue;
        };
        let Some((lo, hi)) = range else {
            continue;
        };

        let below = min_bound
            .as_ref()
            .map(|b| lo.compare(b).map(|o| o == Ordering::Less));
        let above = max_bound
            .as_ref()
            .map(|b| hi.compare(b).map(|o| o == Ordering::Greater));
        if matches!(below, Some(None)) || matches!(above, Some(None)) {
            incomparable.push(schema.name.clone());
            continue;
        }
        if below == Some(Some(true)) || above == Some(Some(true)) {
            let violation = RangeViolation {
                column: schema.name.clone(),
                allowed: (
                    render_bound(&min_bound, "-inf"),
                    render_bound(&max_bound, "inf"),
                ),
                actual: (lo.to_string(), hi.to_string()),
            };
            if schema.column_type.rounding == Rounding::TimeOfDay {
                time_violations.push(violation);
            } else {
                violations.push(violation);
            }
        }
    }

    if !incomparable.is_empty() {
        return Err(FrameError::invalid_value(
            incomparable,
            "values are not comparable with the column's type",
        ));
    }
    if !time_violations.is_empty() {
        return Err(FrameError::OutOfRange {
            columns: time_violations.iter().map(|v| v.column.clone()).collect(),
            message: time_violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        });
    }
    if !violations.is_empty() {
        return Err(FrameError::InsufficientColumnSize { violations });
    }
    Ok(())
}

fn check_unicode(pairs: &[(&ColumnSchema, &Column)]) -> Result<()> {
    let columns: Vec<String> = pairs
        .iter()
        .filter(|(schema, _)| schema.column_type.is_non_unicode())
        .filter(|(_, column)| {
            column
                .values()
                .iter()
                .filter(|v| !v.is_null())
                .any(|v| !text_of(v).is_ascii())
        })
        .map(|(schema, _)| schema.name.clone())
        .collect();

    if columns.is_empty() {
        Ok(())
    } else {
        Err(FrameError::NonUnicodeTypeColumn { columns })
    }
}

fn check_nullability(pairs: &[(&ColumnSchema, &Column)]) -> Result<()> {
    let columns: Vec<String> = pairs
        .iter()
        .filter(|(schema, column)| !schema.is_nullable && column.null_count() > 0)
        .map(|(schema, _)| schema.name.clone())
        .collect();

    if columns.is_empty() {
        Ok(())
    } else {
        Err(FrameError::invalid_value(
            columns,
            "NULL values in non-nullable columns",
        ))
    }
}

fn final_cast(pairs: &[(&ColumnSchema, &Column)]) -> Result<Vec<Column>> {
    let mut out = Vec::with_capacity(pairs.len());
    let mut failed = Vec::new();
    let mut first_error = None;

    for (schema, column) in pairs {
        let host = schema.column_type.host_type;
        let result = if schema.category() == Category::CharacterString {
            Ok(column.map_values(|v| SqlValue::Text(text_of(v))).retyped(host))
        } else {
            column.cast(host)
        };
        match result {
            Ok(cast) => out.push(cast),
            Err(e) => {
                failed.push(schema.name.clone());
                first_error.get_or_insert(e);
            }
        }
    }

    if failed.is_empty() {
        Ok(out)
    } else {
        Err(FrameError::invalid_value(
            failed,
            first_error.unwrap_or_default(),
        ))
    }
}
