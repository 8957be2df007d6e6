//! Table and column schema as introspected from the database.

use rust_decimal::Decimal;
use serde::Serialize;

use super::registry::{Category, ColumnType, WireType};
use crate::core::identifier::TableName;
use crate::core::value::SqlValue;

/// Largest precision representable by the host decimal type.
const MAX_HOST_DECIMAL_PRECISION: u32 = 28;

/// One table column joined with its conversion rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Engine type as reported, including an ` identity` suffix.
    pub sql_type: String,
    /// Character length (`-1` for max) or decimal precision.
    pub declared_size: i32,
    /// Decimal scale or fractional-second digits.
    pub decimal_digits: i32,
    pub is_nullable: bool,
    pub is_identity: bool,
    /// 1-based position in the primary key.
    pub primary_key_sequence: Option<i32>,
    pub primary_key_name: Option<String>,
    /// Conversion rule for the base type.
    pub column_type: ColumnType,
}

impl ColumnSchema {
    pub fn category(&self) -> Category {
        self.column_type.category
    }

    /// Whether values are bounded by length rather than magnitude.
    pub fn is_character(&self) -> bool {
        self.category() == Category::CharacterString
    }

    /// Maximum length in characters; `None` for `max` columns.
    pub fn max_length(&self) -> Option<usize> {
        (self.is_character() && self.declared_size > 0).then_some(self.declared_size as usize)
    }

    /// Value bounds for magnitude checks.
    ///
    /// Decimal bounds follow the declared precision and scale. Beyond the
    /// host decimal's 28 digits the integer digit count still bounds the
    /// magnitude, with the fraction cut to the digits that remain; only more
    /// than 28 integer digits leaves a column unbounded.
    pub fn bounds(&self) -> (Option<SqlValue>, Option<SqlValue>) {
        if self.category() != Category::ExactDecimalNumeric {
            return (
                self.column_type.min_value.clone(),
                self.column_type.max_value.clone(),
            );
        }

        let precision = self.declared_size.max(1) as u32;
        let scale = self.decimal_digits.clamp(0, precision as i32) as u32;
        let integer_digits = precision - scale;
        if integer_digits > MAX_HOST_DECIMAL_PRECISION {
            return (None, None);
        }
        let scale = scale.min(MAX_HOST_DECIMAL_PRECISION - integer_digits);
        let digits = 10i128.pow(integer_digits + scale) - 1;
        match Decimal::try_from_i128_with_scale(digits, scale) {
            Ok(max) => (Some(SqlValue::Decimal(-max)), Some(SqlValue::Decimal(max))),
            Err(_) => (None, None),
        }
    }

    /// Column definition for a staging table, without identity or defaults.
    pub fn type_definition(&self) -> String {
        let base = self.column_type.sql_type;
        match self.column_type.wire_type {
            WireType::Decimal => format!("{}({}, {})", base, self.declared_size, self.decimal_digits),
            WireType::Time | WireType::DateTime2 | WireType::DateTimeOffset => {
                format!("{}({})", base, self.decimal_digits.clamp(0, 7))
            }
            WireType::Char | WireType::VarChar | WireType::NChar | WireType::NVarChar => {
                if self.declared_size <= 0 {
                    format!("{}(max)", base)
                } else {
                    format!("{}({})", base, self.declared_size)
                }
            }
            _ => base.to_string(),
        }
    }
}

/// Schema snapshot for one table, columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub table: TableName,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key column names ordered by key position.
    pub fn primary_key(&self) -> Vec<String> {
        let mut keyed: Vec<(i32, &str)> = self
            .columns
            .iter()
            .filter_map(|c| c.primary_key_sequence.map(|seq| (seq, c.name.as_str())))
            .collect();
        keyed.sort_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, name)| name.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry::lookup;

    fn make_test_column(name: &str, sql_type: &str, size: i32, digits: i32) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            declared_size: size,
            decimal_digits: digits,
            is_nullable: true,
            is_identity: false,
            primary_key_sequence: None,
            primary_key_name: None,
            column_type: lookup(sql_type).unwrap(),
        }
    }

    #[test]
    fn test_decimal_bounds_follow_precision_and_scale() {
        let col = make_test_column("amount", "decimal", 5, 2);
        let (min, max) = col.bounds();
        assert_eq!(max, Some(SqlValue::Decimal(Decimal::new(99999, 2))));
        assert_eq!(min, Some(SqlValue::Decimal(Decimal::new(-99999, 2))));
    }

    #[test]
    fn test_wide_decimal_bounded_by_integer_digits() {
        let col = make_test_column("amount", "decimal", 30, 10);
        let max = Decimal::from_i128_with_scale(10i128.pow(28) - 1, 8);
        assert_eq!(max.to_string(), "99999999999999999999.99999999");
        assert_eq!(
            col.bounds(),
            (Some(SqlValue::Decimal(-max)), Some(SqlValue::Decimal(max)))
        );
    }

    #[test]
    fn test_wide_integer_part_is_unbounded() {
        let col = make_test_column("amount", "numeric", 38, 4);
        assert_eq!(col.bounds(), (None, None));
    }

    #[test]
    fn test_max_length() {
        assert_eq!(make_test_column("s", "varchar", 10, 0).max_length(), Some(10));
        assert_eq!(make_test_column("s", "nvarchar", -1, 0).max_length(), None);
        assert_eq!(make_test_column("n", "int", 4, 0).max_length(), None);
    }

    #[test]
    fn test_type_definition() {
        assert_eq!(make_test_column("a", "decimal", 18, 2).type_definition(), "decimal(18, 2)");
        assert_eq!(make_test_column("a", "nvarchar", -1, 0).type_definition(), "nvarchar(max)");
        assert_eq!(make_test_column("a", "char", 3, 0).type_definition(), "char(3)");
        assert_eq!(make_test_column("a", "datetime2", 27, 7).type_definition(), "datetime2(7)");
        assert_eq!(make_test_column("a", "int", 4, 0).type_definition(), "int");
    }

    #[test]
    fn test_primary_key_order() {
        let mut a = make_test_column("a", "int", 4, 0);
        let mut b = make_test_column("b", "int", 4, 0);
        a.primary_key_sequence = Some(2);
        b.primary_key_sequence = Some(1);
        let schema = TableSchema {
            table: TableName::parse("dbo.t").unwrap(),
            columns: vec![a, b, make_test_column("c", "int", 4, 0)],
        };
        assert_eq!(schema.primary_key(), vec!["b", "a"]);
    }
}
