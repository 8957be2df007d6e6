//! Narrowing values to the engine's stored precision before writing.
//!
//! SQL Server stores time of day, `datetime2` and `datetimeoffset` in 100 ns
//! units, `datetime` in 1/300 s steps (rendered as .000, .003 or .007),
//! `smalldatetime` in whole minutes and decimals at their declared scale.
//! [`prepare`] rounds every affected column, reflects the rounded values back
//! into the caller's frame, and renders wire-ready rows. Rounding never
//! fails; each column that lost precision yields one [`PrecisionWarning`].

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::warn;

use super::model::{ColumnSchema, TableSchema};
use super::registry::Rounding;
use crate::core::frame::{Column, Frame};
use crate::core::value::{format_time_of_day, SqlValue};
use crate::error::{FrameError, Result};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;
const HUNDRED_NANOS: i64 = 100;

/// Non-fatal notice that values were rounded before being written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrecisionWarning {
    pub column: String,
    pub sql_type: String,
    pub message: String,
}

impl fmt::Display for PrecisionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A value together with the diagnostic produced while adjusting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjusted<T> {
    pub value: T,
    pub warning: Option<PrecisionWarning>,
}

/// Rows ready for binding plus the frame as it will be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// Column names in row order: index columns first.
    pub columns: Vec<String>,
    /// Wire-ready values, one vector per row.
    pub rows: Vec<Vec<SqlValue>>,
    /// Caller's frame with rounded values.
    pub frame: Frame,
    pub warnings: Vec<PrecisionWarning>,
}

/// Round every schema column of `frame` and render wire-ready rows.
///
/// Expects a frame already coerced to `schema`. Fails only with
/// [`FrameError::OutOfRange`] for time-of-day values outside a day.
pub fn prepare(schema: &TableSchema, mut frame: Frame) -> Result<Prepared> {
    let columns: Vec<String> = frame
        .all_names()
        .into_iter()
        .filter(|name| schema.contains(name))
        .collect();

    let mut warnings = Vec::new();
    let mut adjusted_columns = Vec::new();
    for name in &columns {
        let (Some(col_schema), Some(column)) = (schema.column(name), frame.column(name)) else {
            continue;
        };
        let adjusted = adjust_column(col_schema, column)?;
        if let Some(warning) = adjusted.warning {
            warn!("{}", warning);
            warnings.push(warning);
        }
        adjusted_columns.push(adjusted.value);
    }
    for column in adjusted_columns {
        frame.replace_column(column)?;
    }

    let rows = frame
        .rows(&columns)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&columns)
                .map(|(value, name)| match schema.column(name) {
                    Some(col_schema) => render(col_schema, value),
                    None => value,
                })
                .collect()
        })
        .collect();

    Ok(Prepared {
        columns,
        rows,
        frame,
        warnings,
    })
}

/// Round one column according to its type's rounding rule.
pub fn adjust_column(schema: &ColumnSchema, column: &Column) -> Result<Adjusted<Column>> {
    let rounding = schema.column_type.rounding;
    if rounding == Rounding::Exact {
        return Ok(Adjusted {
            value: column.clone(),
            warning: None,
        });
    }

    if rounding == Rounding::TimeOfDay {
        let out_of_range: Vec<String> = column
            .values()
            .iter()
            .filter_map(|v| match v {
                SqlValue::Time(t) if round_time_of_day(*t).is_none() => {
                    Some(format_time_of_day(*t, 9))
                }
                _ => None,
            })
            .collect();
        if !out_of_range.is_empty() {
            return Err(FrameError::OutOfRange {
                columns: vec![schema.name.clone()],
                message: format!(
                    "time of day must be within [00:00:00, 23:59:59.9999999], got {}",
                    out_of_range.join(", ")
                ),
            });
        }
    }

    let mut changed = false;
    let adjusted = column.map_values(|value| {
        let rounded = round_value(schema, value);
        if rounded != *value {
            changed = true;
        }
        rounded
    });

    let warning = changed.then(|| PrecisionWarning {
        column: schema.name.clone(),
        sql_type: schema.column_type.sql_type.to_string(),
        message: warning_message(schema),
    });

    Ok(Adjusted {
        value: adjusted,
        warning,
    })
}

fn round_value(schema: &ColumnSchema, value: &SqlValue) -> SqlValue {
    match (schema.column_type.rounding, value) {
        (Rounding::TimeOfDay, SqlValue::Time(t)) => {
            SqlValue::Time(round_time_of_day(*t).unwrap_or(*t))
        }
        (Rounding::HundredNanos, SqlValue::DateTime(dt)) => {
            SqlValue::DateTime(round_hundred_nanos(*dt))
        }
        (Rounding::ThreeMillis, SqlValue::DateTime(dt)) => {
            SqlValue::DateTime(round_three_millis(*dt))
        }
        (Rounding::Minute, SqlValue::DateTime(dt)) => SqlValue::DateTime(round_minute(*dt)),
        (Rounding::HundredNanosOffset, SqlValue::DateTimeOffset(dt)) => {
            SqlValue::DateTimeOffset(round_hundred_nanos_offset(*dt))
        }
        (Rounding::DecimalScale, SqlValue::Decimal(d)) => {
            SqlValue::Decimal(round_decimal(*d, schema.decimal_digits.max(0) as u32))
        }
        (_, other) => other.clone(),
    }
}

fn warning_message(schema: &ColumnSchema) -> String {
    let name = &schema.name;
    let sql_type = schema.column_type.sql_type;
    match schema.column_type.rounding {
        Rounding::ThreeMillis => format!(
            "Millisecond precision for column '{}' will be rounded as SQL data type '{}' \
             rounds to increments of .000, .003, or .007 seconds.",
            name, sql_type
        ),
        Rounding::Minute => format!(
            "Seconds for column '{}' will be rounded to the nearest minute as SQL data type '{}' \
             stores whole minutes.",
            name, sql_type
        ),
        Rounding::DecimalScale => format!(
            "Decimal digits for column '{}' will be rounded to {} decimal places to fit the scale of \
             this column.",
            name, schema.decimal_digits
        ),
        _ => format!(
            "Nanosecond precision for column '{}' will be rounded as SQL data type '{}' allows \
             7 max decimal places.",
            name, sql_type
        ),
    }
}

fn round_nanos_to_hundred(nanos: i64) -> i64 {
    (nanos + HUNDRED_NANOS / 2) / HUNDRED_NANOS * HUNDRED_NANOS
}

/// Round a time of day to 100 ns.
///
/// Returns `None` for negative values and values that are, or round up to,
/// a full day or more.
pub fn round_time_of_day(delta: TimeDelta) -> Option<TimeDelta> {
    let nanos = delta.num_nanoseconds()?;
    if !(0..NANOS_PER_DAY).contains(&nanos) {
        return None;
    }
    let rounded = round_nanos_to_hundred(nanos);
    (rounded < NANOS_PER_DAY).then(|| TimeDelta::nanoseconds(rounded))
}

/// Shift a timestamp so its sub-second part becomes `target` nanoseconds.
fn with_subsecond(dt: NaiveDateTime, current: i64, target: i64) -> NaiveDateTime {
    dt.checked_add_signed(TimeDelta::nanoseconds(target - current))
        .unwrap_or(dt)
}

/// Round a naive timestamp to 100 ns.
pub fn round_hundred_nanos(dt: NaiveDateTime) -> NaiveDateTime {
    let nanos = dt.nanosecond() as i64;
    with_subsecond(dt, nanos, round_nanos_to_hundred(nanos))
}

/// Round an offset-aware timestamp to 100 ns, keeping its offset.
pub fn round_hundred_nanos_offset(dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let nanos = dt.nanosecond() as i64;
    dt.checked_add_signed(TimeDelta::nanoseconds(round_nanos_to_hundred(nanos) - nanos))
        .unwrap_or(dt)
}

/// Round a timestamp to the nearest `datetime` step.
///
/// The last millisecond digit snaps to the nearest of 0, 3, 7 or 10 (a carry
/// into the next hundredth). Ties go to the larger step, the first of
/// 10, 7, 3 and 0 at equal distance.
pub fn round_three_millis(dt: NaiveDateTime) -> NaiveDateTime {
    const STEPS_MS: [i64; 4] = [10, 7, 3, 0];
    const TEN_MS: i64 = 10_000_000;

    let nanos = dt.nanosecond() as i64;
    let hundredths = nanos / TEN_MS;
    let remainder = nanos % TEN_MS;

    let mut best = STEPS_MS[0];
    let mut best_distance = i64::MAX;
    for step in STEPS_MS {
        let distance = (remainder - step * 1_000_000).abs();
        if distance < best_distance {
            best = step;
            best_distance = distance;
        }
    }

    with_subsecond(dt, nanos, hundredths * TEN_MS + best * 1_000_000)
}

/// Round a timestamp to the nearest millisecond, half a millisecond rounding up.
///
/// Decoded `datetime` values carry 1/300 s ticks as nanoseconds
/// (`.006666666`); this restores the stored `.007`.
pub fn round_millis(dt: NaiveDateTime) -> NaiveDateTime {
    const MILLI: i64 = 1_000_000;
    let nanos = dt.nanosecond() as i64;
    with_subsecond(dt, nanos, (nanos + MILLI / 2) / MILLI * MILLI)
}

/// Round a timestamp to the nearest minute, half a minute rounding up.
pub fn round_minute(dt: NaiveDateTime) -> NaiveDateTime {
    let within = dt.second() as i64 * NANOS_PER_SECOND + dt.nanosecond() as i64;
    let target = if within >= 30 * NANOS_PER_SECOND {
        60 * NANOS_PER_SECOND
    } else {
        0
    };
    dt.checked_add_signed(TimeDelta::nanoseconds(target - within))
        .unwrap_or(dt)
}

/// Round a decimal to `scale` places, midpoints away from zero.
pub fn round_decimal(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

fn seven_digit_fraction(nanos: u32) -> String {
    format!("{:07}", (nanos % 1_000_000_000) / 100)
}

/// Render a rounded value for binding.
///
/// Temporal values are bound as text the engine converts exactly; the
/// `datetime` family uses the ISO `T` separator, which no session date
/// format setting can reinterpret.
pub fn render(schema: &ColumnSchema, value: SqlValue) -> SqlValue {
    match (schema.column_type.rounding, value) {
        (Rounding::TimeOfDay, SqlValue::Time(t)) => SqlValue::Text(format_time_of_day(t, 7)),
        (Rounding::ThreeMillis, SqlValue::DateTime(dt)) => {
            SqlValue::Text(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        }
        (Rounding::Minute, SqlValue::DateTime(dt)) => {
            SqlValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        (Rounding::HundredNanos, SqlValue::DateTime(dt)) => SqlValue::Text(format!(
            "{}.{}",
            dt.format("%Y-%m-%d %H:%M:%S"),
            seven_digit_fraction(dt.nanosecond())
        )),
        (Rounding::HundredNanosOffset, SqlValue::DateTimeOffset(dt)) => SqlValue::Text(format!(
            "{}.{}{}",
            dt.format("%Y-%m-%d %H:%M:%S"),
            seven_digit_fraction(dt.nanosecond()),
            dt.format("%:z")
        )),
        (_, other) => other,
    }
}
