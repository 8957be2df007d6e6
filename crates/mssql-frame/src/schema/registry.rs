//! Conversion rules for SQL Server column types.
//!
//! Each supported engine type maps to a [`ColumnType`]: its value category,
//! representable range, host representation, binding type and the rounding
//! rule applied before values are written. Supporting a new engine type means
//! adding a row to [`lookup`].

use chrono::{NaiveDate, TimeDelta};
use serde::Serialize;

use crate::core::value::{assume_utc, DataType, SqlValue};

/// Value-semantics grouping shared by several engine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Boolean,
    ExactWholeNumeric,
    ExactDecimalNumeric,
    ApproximateDecimalNumeric,
    DateTime,
    CharacterString,
}

/// Engine-level parameter type used when binding values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Date,
    Time,
    SmallDateTime,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Char,
    VarChar,
    NChar,
    NVarChar,
}

/// How values are narrowed to the engine's stored precision before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Stored exactly as given.
    Exact,
    /// Time of day in 100 ns units.
    TimeOfDay,
    /// Whole minutes.
    Minute,
    /// Milliseconds ending in 0, 3 or 7.
    ThreeMillis,
    /// 100 ns units.
    HundredNanos,
    /// 100 ns units, with a UTC offset.
    HundredNanosOffset,
    /// The column's declared scale.
    DecimalScale,
}

/// Conversion rule for one engine type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnType {
    /// Engine type name.
    pub sql_type: &'static str,
    pub category: Category,
    /// Smallest representable value, `None` when unbounded or length-checked.
    pub min_value: Option<SqlValue>,
    /// Largest representable value, `None` when unbounded or length-checked.
    pub max_value: Option<SqlValue>,
    /// Host representation after coercion.
    pub host_type: DataType,
    pub wire_type: WireType,
    /// Binding size in bytes or characters; 0 means variable.
    pub wire_size: u32,
    /// Decimal places or fractional-second digits the engine stores.
    pub wire_precision: u8,
    pub rounding: Rounding,
}

impl ColumnType {
    /// Widest host representation within this type's category.
    ///
    /// Untyped values are converted to this before range checks so that a
    /// large value is never narrowed before its magnitude is known.
    pub fn widening_type(&self) -> DataType {
        match self.category {
            Category::Boolean => DataType::Boolean,
            Category::ExactWholeNumeric => DataType::Int64,
            Category::ExactDecimalNumeric => DataType::Decimal,
            Category::ApproximateDecimalNumeric => DataType::Float64,
            Category::DateTime => match self.host_type {
                DataType::Time => DataType::Time,
                DataType::TimestampTz => DataType::TimestampTz,
                _ => DataType::Timestamp,
            },
            Category::CharacterString => DataType::String,
        }
    }

    /// Whether the type stores only ASCII text.
    pub fn is_non_unicode(&self) -> bool {
        matches!(self.wire_type, WireType::Char | WireType::VarChar)
    }
}

/// Every engine type with a conversion rule.
pub const SUPPORTED_TYPES: &[&str] = &[
    "bit",
    "tinyint",
    "smallint",
    "int",
    "bigint",
    "real",
    "float",
    "decimal",
    "numeric",
    "time",
    "date",
    "smalldatetime",
    "datetime",
    "datetime2",
    "datetimeoffset",
    "char",
    "varchar",
    "nchar",
    "nvarchar",
];

#[allow(clippy::too_many_arguments)]
fn rule(
    sql_type: &'static str,
    category: Category,
    bounds: (Option<SqlValue>, Option<SqlValue>),
    host_type: DataType,
    wire_type: WireType,
    wire_size: u32,
    wire_precision: u8,
    rounding: Rounding,
) -> ColumnType {
    ColumnType {
        sql_type,
        category,
        min_value: bounds.0,
        max_value: bounds.1,
        host_type,
        wire_type,
        wire_size,
        wire_precision,
        rounding,
    }
}

fn timestamp(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nanos: u32) -> Option<SqlValue> {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_nano_opt(h, mi, s, nanos))
        .map(SqlValue::DateTime)
}

fn numeric(min: impl Into<SqlValue>, max: impl Into<SqlValue>) -> (Option<SqlValue>, Option<SqlValue>) {
    (Some(min.into()), Some(max.into()))
}

fn unbounded() -> (Option<SqlValue>, Option<SqlValue>) {
    (None, None)
}

/// Look up the conversion rule for an engine type name.
///
/// Matching is case-insensitive. Unknown types return `None` so callers can
/// collect every unsupported column before failing.
pub fn lookup(sql_type: &str) -> Option<ColumnType> {
    use Category::*;

    let t = match sql_type.trim().to_lowercase().as_str() {
        "bit" => rule(
            "bit",
            Boolean,
            numeric(false, true),
            DataType::Boolean,
            WireType::Bit,
            1,
            0,
            Rounding::Exact,
        ),
        "tinyint" => rule(
            "tinyint",
            ExactWholeNumeric,
            numeric(0i64, 255i64),
            DataType::UInt8,
            WireType::TinyInt,
            1,
            0,
            Rounding::Exact,
        ),
        "smallint" => rule(
            "smallint",
            ExactWholeNumeric,
            numeric(i16::MIN as i64, i16::MAX as i64),
            DataType::Int16,
            WireType::SmallInt,
            2,
            0,
            Rounding::Exact,
        ),
        "int" => rule(
            "int",
            ExactWholeNumeric,
            numeric(i32::MIN as i64, i32::MAX as i64),
            DataType::Int32,
            WireType::Int,
            4,
            0,
            Rounding::Exact,
        ),
        "bigint" => rule(
            "bigint",
            ExactWholeNumeric,
            numeric(i64::MIN, i64::MAX),
            DataType::Int64,
            WireType::BigInt,
            8,
            0,
            Rounding::Exact,
        ),
        "real" => rule(
            "real",
            ApproximateDecimalNumeric,
            numeric(-3.40e38, 3.40e38),
            DataType::Float32,
            WireType::Real,
            4,
            24,
            Rounding::Exact,
        ),
        "float" => rule(
            "float",
            ApproximateDecimalNumeric,
            numeric(-1.79e308, 1.79e308),
            DataType::Float64,
            WireType::Float,
            8,
            53,
            Rounding::Exact,
        ),
        "decimal" | "numeric" => rule(
            if sql_type.trim().eq_ignore_ascii_case("decimal") {
                "decimal"
            } else {
                "numeric"
            },
            ExactDecimalNumeric,
            unbounded(),
            DataType::Decimal,
            WireType::Decimal,
            17,
            38,
            Rounding::DecimalScale,
        ),
        "time" => rule(
            "time",
            DateTime,
            (
                Some(SqlValue::Time(TimeDelta::zero())),
                Some(SqlValue::Time(TimeDelta::nanoseconds(86_399_999_999_900))),
            ),
            DataType::Time,
            WireType::Time,
            16,
            7,
            Rounding::TimeOfDay,
        ),
        "date" => rule(
            "date",
            DateTime,
            (
                NaiveDate::from_ymd_opt(1, 1, 1).map(SqlValue::Date),
                NaiveDate::from_ymd_opt(9999, 12, 31).map(SqlValue::Date),
            ),
            DataType::Date,
            WireType::Date,
            10,
            0,
            Rounding::Exact,
        ),
        "smalldatetime" => rule(
            "smalldatetime",
            DateTime,
            (
                timestamp(1900, 1, 1, 0, 0, 0, 0),
                timestamp(2079, 6, 6, 23, 59, 0, 0),
            ),
            DataType::Timestamp,
            WireType::SmallDateTime,
            16,
            0,
            Rounding::Minute,
        ),
        "datetime" => rule(
            "datetime",
            DateTime,
            (
                timestamp(1753, 1, 1, 0, 0, 0, 0),
                timestamp(9999, 12, 31, 23, 59, 59, 997_000_000),
            ),
            DataType::Timestamp,
            WireType::DateTime,
            23,
            3,
            Rounding::ThreeMillis,
        ),
        "datetime2" => rule(
            "datetime2",
            DateTime,
            (
                timestamp(1, 1, 1, 0, 0, 0, 0),
                timestamp(9999, 12, 31, 23, 59, 59, 999_999_900),
            ),
            DataType::Timestamp,
            WireType::DateTime2,
            27,
            7,
            Rounding::HundredNanos,
        ),
        "datetimeoffset" => {
            let utc = |v: Option<SqlValue>| match v {
                Some(SqlValue::DateTime(dt)) => Some(SqlValue::DateTimeOffset(assume_utc(dt))),
                _ => None,
            };
            rule(
                "datetimeoffset",
                DateTime,
                (
                    utc(timestamp(1, 1, 1, 0, 0, 0, 0)),
                    utc(timestamp(9999, 12, 31, 23, 59, 59, 999_999_900)),
                ),
                DataType::TimestampTz,
                WireType::DateTimeOffset,
                34,
                7,
                Rounding::HundredNanosOffset,
            )
        }
        "char" => rule(
            "char",
            CharacterString,
            unbounded(),
            DataType::String,
            WireType::Char,
            0,
            0,
            Rounding::Exact,
        ),
        "varchar" => rule(
            "varchar",
            CharacterString,
            unbounded(),
            DataType::String,
            WireType::VarChar,
            0,
            0,
            Rounding::Exact,
        ),
        "nchar" => rule(
            "nchar",
            CharacterString,
            unbounded(),
            DataType::String,
            WireType::NChar,
            0,
            0,
            Rounding::Exact,
        ),
        "nvarchar" => rule(
            "nvarchar",
            CharacterString,
            unbounded(),
            DataType::String,
            WireType::NVarChar,
            0,
            0,
            Rounding::Exact,
        ),
        _ => return None,
    };
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_supported_type_resolves() {
        for name in SUPPORTED_TYPES {
            let rule = lookup(name).unwrap_or_else(|| panic!("missing rule for {}", name));
            assert_eq!(rule.sql_type, *name);
        }
    }

    #[test]
    fn test_lookup_is_deterministic_and_case_insensitive() {
        assert_eq!(lookup("INT"), lookup("int"));
        assert_eq!(lookup("NVarChar").map(|t| t.wire_type), Some(WireType::NVarChar));
    }

    #[test]
    fn test_unregistered_types_are_not_found() {
        assert!(lookup("geography").is_none());
        assert!(lookup("int identity").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_integer_bounds() {
        let tinyint = lookup("tinyint").unwrap();
        assert_eq!(tinyint.min_value, Some(SqlValue::I64(0)));
        assert_eq!(tinyint.max_value, Some(SqlValue::I64(255)));
        assert_eq!(tinyint.host_type, DataType::UInt8);
        assert_eq!(tinyint.widening_type(), DataType::Int64);
    }

    #[test]
    fn test_temporal_widening_types() {
        assert_eq!(lookup("time").unwrap().widening_type(), DataType::Time);
        assert_eq!(lookup("date").unwrap().widening_type(), DataType::Timestamp);
        assert_eq!(lookup("datetime2").unwrap().widening_type(), DataType::Timestamp);
        assert_eq!(
            lookup("datetimeoffset").unwrap().widening_type(),
            DataType::TimestampTz
        );
    }

    #[test]
    fn test_datetime_precision_variants() {
        assert_eq!(lookup("datetime").unwrap().rounding, Rounding::ThreeMillis);
        assert_eq!(lookup("datetime2").unwrap().wire_precision, 7);
        assert!(lookup("datetimeoffset").unwrap().max_value.is_some());
    }

    #[test]
    fn test_non_unicode_types() {
        assert!(lookup("varchar").unwrap().is_non_unicode());
        assert!(lookup("char").unwrap().is_non_unicode());
        assert!(!lookup("nvarchar").unwrap().is_non_unicode());
    }
}
