//! Cell values and host-level column representations.
//!
//! [`SqlValue`] is the single owned cell type that flows through the
//! conversion pipeline, the wire binding layer and the read path.
//! [`DataType`] tags a column with the host representation its values use;
//! [`DataType::Object`] marks an untyped, heterogeneous column.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

/// Host-level representation of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Untyped column; values may be any variant.
    Object,
    Boolean,
    UInt8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    String,
    Date,
    /// Signed time-of-day duration.
    Time,
    /// Timezone-naive timestamp.
    Timestamp,
    /// Timestamp carrying a UTC offset.
    TimestampTz,
}

impl DataType {
    /// Whether this is an integer representation.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Object => "object",
            DataType::Boolean => "boolean",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Decimal => "decimal",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
            DataType::TimestampTz => "timestamptz",
        };
        f.write_str(name)
    }
}

/// A single owned cell value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    /// Time of day as an offset from midnight. Kept signed and unbounded so
    /// out-of-range input survives until it can be reported.
    Time(TimeDelta),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
}

/// Numeric view used for cross-type comparison and casting.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i128),
    Float(f64),
    Dec(Decimal),
}

impl SqlValue {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The host representation of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            SqlValue::Null => return None,
            SqlValue::Bool(_) => DataType::Boolean,
            SqlValue::U8(_) => DataType::UInt8,
            SqlValue::I16(_) => DataType::Int16,
            SqlValue::I32(_) => DataType::Int32,
            SqlValue::I64(_) => DataType::Int64,
            SqlValue::F32(_) => DataType::Float32,
            SqlValue::F64(_) => DataType::Float64,
            SqlValue::Decimal(_) => DataType::Decimal,
            SqlValue::Text(_) => DataType::String,
            SqlValue::Date(_) => DataType::Date,
            SqlValue::Time(_) => DataType::Time,
            SqlValue::DateTime(_) => DataType::Timestamp,
            SqlValue::DateTimeOffset(_) => DataType::TimestampTz,
        })
    }

    /// Whether the value may live in a column of the given representation.
    pub fn fits(&self, dtype: DataType) -> bool {
        dtype == DataType::Object || self.data_type().map_or(true, |t| t == dtype)
    }

    fn numeric(&self) -> Option<Numeric> {
        match self {
            SqlValue::U8(v) => Some(Numeric::Int(*v as i128)),
            SqlValue::I16(v) => Some(Numeric::Int(*v as i128)),
            SqlValue::I32(v) => Some(Numeric::Int(*v as i128)),
            SqlValue::I64(v) => Some(Numeric::Int(*v as i128)),
            SqlValue::F32(v) => Some(Numeric::Float(*v as f64)),
            SqlValue::F64(v) => Some(Numeric::Float(*v)),
            SqlValue::Decimal(v) => Some(Numeric::Dec(*v)),
            _ => None,
        }
    }

    /// Order two values, converting across compatible representations.
    ///
    /// Returns `None` when the values are not comparable (different
    /// categories, or a NaN).
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return match (a, b) {
                (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
                (Numeric::Dec(a), Numeric::Dec(b)) => Some(a.cmp(&b)),
                (Numeric::Int(a), Numeric::Dec(b)) => {
                    Decimal::try_from_i128_with_scale(a, 0).ok().map(|a| a.cmp(&b))
                }
                (Numeric::Dec(a), Numeric::Int(b)) => {
                    Decimal::try_from_i128_with_scale(b, 0).ok().map(|b| a.cmp(&b))
                }
                (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
            };
        }

        match (self, other) {
            (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::Date(a), SqlValue::Date(b)) => Some(a.cmp(b)),
            (SqlValue::Date(a), SqlValue::DateTime(b)) => Some(midnight(*a).cmp(b)),
            (SqlValue::DateTime(a), SqlValue::Date(b)) => Some(a.cmp(&midnight(*b))),
            (SqlValue::DateTime(a), SqlValue::DateTime(b)) => Some(a.cmp(b)),
            (SqlValue::DateTimeOffset(a), SqlValue::DateTimeOffset(b)) => Some(a.cmp(b)),
            (SqlValue::DateTimeOffset(a), SqlValue::DateTime(b)) => Some(a.naive_utc().cmp(b)),
            (SqlValue::DateTime(a), SqlValue::DateTimeOffset(b)) => Some(a.cmp(&b.naive_utc())),
            (SqlValue::Time(a), SqlValue::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Convert to the given host representation.
    ///
    /// NULL stays NULL, and a floating-point NaN becomes NULL. The error is a
    /// short description of the value that could not be converted.
    pub fn cast(&self, dtype: DataType) -> std::result::Result<SqlValue, String> {
        if self.is_null() || dtype == DataType::Object || self.data_type() == Some(dtype) {
            return Ok(match self {
                SqlValue::F64(v) if v.is_nan() => SqlValue::Null,
                SqlValue::F32(v) if v.is_nan() => SqlValue::Null,
                other => other.clone(),
            });
        }

        let fail = || format!("cannot convert {} '{}' to {}", self.kind(), self, dtype);

        match dtype {
            DataType::Object => Ok(self.clone()),
            DataType::Boolean => match self {
                SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(SqlValue::Bool(true)),
                    "false" | "0" => Ok(SqlValue::Bool(false)),
                    _ => Err(fail()),
                },
                _ => match self.to_integer() {
                    Some(0) => Ok(SqlValue::Bool(false)),
                    Some(1) => Ok(SqlValue::Bool(true)),
                    _ => Err(fail()),
                },
            },
            DataType::UInt8 => {
                let v = self.to_integer().ok_or_else(fail)?;
                u8::try_from(v).map(SqlValue::U8).map_err(|_| fail())
            }
            DataType::Int16 => {
                let v = self.to_integer().ok_or_else(fail)?;
                i16::try_from(v).map(SqlValue::I16).map_err(|_| fail())
            }
            DataType::Int32 => {
                let v = self.to_integer().ok_or_else(fail)?;
                i32::try_from(v).map(SqlValue::I32).map_err(|_| fail())
            }
            DataType::Int64 => {
                let v = self.to_integer().ok_or_else(fail)?;
                i64::try_from(v).map(SqlValue::I64).map_err(|_| fail())
            }
            DataType::Float64 => match self.to_float() {
                Some(v) if v.is_nan() => Ok(SqlValue::Null),
                Some(v) => Ok(SqlValue::F64(v)),
                None => Err(fail()),
            },
            DataType::Float32 => match self.to_float() {
                Some(v) if v.is_nan() => Ok(SqlValue::Null),
                Some(v) if v.is_infinite() || v.abs() <= f32::MAX as f64 => {
                    Ok(SqlValue::F32(v as f32))
                }
                _ => Err(fail()),
            },
            DataType::Decimal => match self {
                SqlValue::Text(s) => {
                    let s = s.trim();
                    Decimal::from_str(s)
                        .or_else(|_| Decimal::from_scientific(s))
                        .map(SqlValue::Decimal)
                        .map_err(|_| fail())
                }
                SqlValue::F32(v) if v.is_nan() => Ok(SqlValue::Null),
                SqlValue::F64(v) if v.is_nan() => Ok(SqlValue::Null),
                SqlValue::F32(v) => Decimal::try_from(*v)
                    .map(SqlValue::Decimal)
                    .map_err(|_| fail()),
                SqlValue::F64(v) => Decimal::try_from(*v)
                    .map(SqlValue::Decimal)
                    .map_err(|_| fail()),
                SqlValue::Bool(b) => Ok(SqlValue::Decimal(Decimal::from(*b as u8))),
                _ => match self.numeric() {
                    Some(Numeric::Int(v)) => Decimal::try_from_i128_with_scale(v, 0)
                        .map(SqlValue::Decimal)
                        .map_err(|_| fail()),
                    _ => Err(fail()),
                },
            },
            DataType::String => Ok(SqlValue::Text(self.to_string())),
            DataType::Date => match self {
                SqlValue::DateTime(dt) if dt.time() == NaiveTime::default() => {
                    Ok(SqlValue::Date(dt.date()))
                }
                SqlValue::Text(s) => parse_date(s).map(SqlValue::Date).ok_or_else(fail),
                _ => Err(fail()),
            },
            DataType::Time => match self {
                SqlValue::Text(s) => parse_time_of_day(s).map(SqlValue::Time).ok_or_else(fail),
                _ => Err(fail()),
            },
            DataType::Timestamp => match self {
                SqlValue::Date(d) => Ok(SqlValue::DateTime(midnight(*d))),
                SqlValue::Text(s) => parse_timestamp(s).map(SqlValue::DateTime).ok_or_else(fail),
                _ => Err(fail()),
            },
            DataType::TimestampTz => match self {
                SqlValue::DateTime(dt) => Ok(SqlValue::DateTimeOffset(assume_utc(*dt))),
                SqlValue::Date(d) => Ok(SqlValue::DateTimeOffset(assume_utc(midnight(*d)))),
                SqlValue::Text(s) => parse_timestamp_tz(s)
                    .map(SqlValue::DateTimeOffset)
                    .ok_or_else(fail),
                _ => Err(fail()),
            },
        }
    }

    /// Integer view, accepting whole floats, whole decimals and numeric text.
    fn to_integer(&self) -> Option<i128> {
        match self {
            SqlValue::Bool(b) => Some(*b as i128),
            SqlValue::Text(s) => {
                let s = s.trim();
                s.parse::<i128>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_float))
            }
            _ => match self.numeric()? {
                Numeric::Int(v) => Some(v),
                Numeric::Float(v) => whole_float(v),
                Numeric::Dec(v) if v.fract().is_zero() => v.to_i128(),
                Numeric::Dec(_) => None,
            },
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            SqlValue::Bool(b) => Some(*b as u8 as f64),
            SqlValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => self.numeric().map(Numeric::to_f64),
        }
    }

    fn kind(&self) -> &'static str {
        match self.data_type() {
            Some(DataType::String) => "text",
            Some(DataType::Boolean) => "boolean",
            Some(t) if t.is_integer() => "integer",
            Some(DataType::Float32 | DataType::Float64 | DataType::Decimal) => "number",
            Some(_) => "temporal value",
            None => "null",
        }
    }
}

impl Numeric {
    fn to_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
            Numeric::Dec(v) => v.to_f64().unwrap_or(f64::NAN),
        }
    }
}

fn whole_float(v: f64) -> Option<i128> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1.7e38 {
        Some(v as i128)
    } else {
        None
    }
}

pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::default())
}

pub(crate) fn assume_utc(dt: NaiveDateTime) -> DateTime<FixedOffset> {
    DateTime::<FixedOffset>::from_naive_utc_and_offset(dt, Utc.fix())
}

/// Render a time-of-day duration as `[-]HH:MM:SS.f` with `digits` fractional digits.
pub(crate) fn format_time_of_day(delta: TimeDelta, digits: usize) -> String {
    let total = delta.num_nanoseconds().unwrap_or(i64::MAX);
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let nanos = total % 1_000_000_000;
    let secs = total / 1_000_000_000;
    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if digits > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(&fraction[..digits.min(9)]);
    }
    out
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const TIMESTAMP_TZ_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Parse a timezone-naive timestamp or a bare date.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(midnight))
}

/// Parse a timestamp with an offset; a missing offset is read as UTC.
pub fn parse_timestamp_tz(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    TIMESTAMP_TZ_FORMATS
        .iter()
        .find_map(|f| DateTime::parse_from_str(s, f).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok())
        .or_else(|| parse_timestamp(s).map(assume_utc))
}

/// Parse a bare date, or a timestamp falling exactly on midnight.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        parse_timestamp(s)
            .filter(|dt| dt.time() == NaiveTime::default())
            .map(|dt| dt.date())
    })
}

/// Parse `[-]H:MM:SS[.fffffffff]` into a signed duration from midnight.
///
/// Hours are not capped at 23 so that out-of-range input can be reported
/// by range validation instead of failing as unparseable.
pub fn parse_time_of_day(s: &str) -> Option<TimeDelta> {
    let s = s.trim();
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = body.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds_part = parts.next().unwrap_or("0");
    if parts.next().is_some() || !(0..60).contains(&minutes) {
        return None;
    }

    let (whole, fraction) = match seconds_part.split_once('.') {
        Some((w, f)) => (w, f),
        None => (seconds_part, ""),
    };
    let seconds: i64 = whole.parse().ok()?;
    if !(0..60).contains(&seconds)
        || fraction.len() > 9
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let nanos: i64 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction).parse().ok()?
    };

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?
        .checked_mul(1_000_000_000)?
        .checked_add(nanos)?;
    Some(TimeDelta::nanoseconds(if negative { -total } else { total }))
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::U8(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            SqlValue::Time(v) => f.write_str(&format_time_of_day(*v, 9)),
            SqlValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f%:z")),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::U8(v) => serializer.serialize_u8(*v),
            SqlValue::I16(v) => serializer.serialize_i16(*v),
            SqlValue::I32(v) => serializer.serialize_i32(*v),
            SqlValue::I64(v) => serializer.serialize_i64(*v),
            SqlValue::F32(v) => serializer.serialize_f32(*v),
            SqlValue::F64(v) => serializer.serialize_f64(*v),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::U8(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<TimeDelta> for SqlValue {
    fn from(v: TimeDelta) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
