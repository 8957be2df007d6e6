//! In-memory typed table.
//!
//! A [`Frame`] holds named, equally long [`Column`]s plus an optional key
//! index: a separate ordered set of columns identifying each row, mirroring
//! a table's primary key.

use serde::{Deserialize, Serialize};

use super::value::{DataType, SqlValue};
use crate::error::{FrameError, Result};

/// A named column of values sharing one host representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    name: String,
    dtype: DataType,
    values: Vec<SqlValue>,
}

impl Column {
    /// Create a column, checking every non-null value against `dtype`.
    pub fn new(name: impl Into<String>, dtype: DataType, values: Vec<SqlValue>) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = values.iter().find(|v| !v.fits(dtype)) {
            return Err(FrameError::invalid_value(
                vec![name],
                format!("value '{}' does not match column type {}", bad, dtype),
            ));
        }
        Ok(Self {
            name,
            dtype,
            values,
        })
    }

    /// Create an untyped column holding arbitrary values.
    pub fn object(name: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            name: name.into(),
            dtype: DataType::Object,
            values,
        }
    }

    /// Create a typed column from native values, `None` meaning NULL.
    pub fn from_values<T: Into<SqlValue>>(
        name: impl Into<String>,
        dtype: DataType,
        values: impl IntoIterator<Item = T>,
    ) -> Result<Self> {
        Self::new(name, dtype, values.into_iter().map(Into::into).collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of NULL values.
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Cast every value to `dtype`, returning the first failure message.
    pub fn cast(&self, dtype: DataType) -> std::result::Result<Column, String> {
        let values = self
            .values
            .iter()
            .map(|v| v.cast(dtype))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Column {
            name: self.name.clone(),
            dtype,
            values,
        })
    }

    /// Apply `f` to every non-null value, keeping the column type.
    pub(crate) fn map_values<F>(&self, mut f: F) -> Column
    where
        F: FnMut(&SqlValue) -> SqlValue,
    {
        Column {
            name: self.name.clone(),
            dtype: self.dtype,
            values: self
                .values
                .iter()
                .map(|v| if v.is_null() { SqlValue::Null } else { f(v) })
                .collect(),
        }
    }

    /// Relabel the column type. Callers guarantee the values fit.
    pub(crate) fn retyped(mut self, dtype: DataType) -> Column {
        self.dtype = dtype;
        self
    }
}

/// An in-memory table with an optional key index.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Frame {
    index: Vec<Column>,
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame from columns of equal length with distinct names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let frame = Self {
            index: Vec::new(),
            columns,
        };
        frame.check_shape()?;
        Ok(frame)
    }

    /// Build a frame and move the named columns into the index.
    pub fn with_index(columns: Vec<Column>, index: &[&str]) -> Result<Self> {
        let mut frame = Self::new(columns)?;
        let names: Vec<String> = index.iter().map(|s| s.to_string()).collect();
        frame.set_index(&names)?;
        Ok(frame)
    }

    fn check_shape(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let rows = self.num_rows();
        for col in self.index.iter().chain(&self.columns) {
            if !seen.insert(col.name()) {
                return Err(FrameError::invalid_value(
                    vec![col.name().to_string()],
                    "duplicate column name",
                ));
            }
            if col.len() != rows {
                return Err(FrameError::invalid_value(
                    vec![col.name().to_string()],
                    format!("column has {} rows, expected {}", col.len(), rows),
                ));
            }
        }
        Ok(())
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.index
            .first()
            .or_else(|| self.columns.first())
            .map_or(0, Column::len)
    }

    /// Key index columns, in key order.
    pub fn index(&self) -> &[Column] {
        &self.index
    }

    pub fn index_names(&self) -> Vec<String> {
        self.index.iter().map(|c| c.name().to_string()).collect()
    }

    /// Non-index columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// Index names followed by column names.
    pub fn all_names(&self) -> Vec<String> {
        let mut names = self.index_names();
        names.extend(self.column_names());
        names
    }

    /// Look up a column by name in the index or the columns.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index
            .iter()
            .chain(&self.columns)
            .find(|c| c.name() == name)
    }

    /// Whether `name` is an index or regular column.
    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replace the index or regular column with the same name.
    pub fn replace_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.num_rows() {
            return Err(FrameError::invalid_value(
                vec![column.name().to_string()],
                "replacement column has a different row count",
            ));
        }
        let slot = self
            .index
            .iter_mut()
            .chain(self.columns.iter_mut())
            .find(|c| c.name() == column.name());
        match slot {
            Some(slot) => {
                *slot = column;
                Ok(())
            }
            None => Err(FrameError::missing_columns(
                "frame",
                vec![column.name().to_string()],
            )),
        }
    }

    /// Move index columns back to the front of the regular columns.
    pub fn reset_index(&mut self) {
        let mut columns = std::mem::take(&mut self.index);
        columns.append(&mut self.columns);
        self.columns = columns;
    }

    /// Install the named columns, in order, as the index.
    ///
    /// Any existing index is flattened first.
    pub fn set_index(&mut self, names: &[String]) -> Result<()> {
        self.reset_index();
        let missing: Vec<String> = names
            .iter()
            .filter(|n| !self.columns.iter().any(|c| c.name() == n.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FrameError::missing_columns("frame", missing));
        }

        for name in names {
            if let Some(pos) = self.columns.iter().position(|c| c.name() == name.as_str()) {
                let col = self.columns.remove(pos);
                self.index.push(col);
            }
        }
        Ok(())
    }

    /// Values of row `i` in `names` order. Unknown names yield NULL.
    pub fn row(&self, i: usize, names: &[String]) -> Vec<SqlValue> {
        names
            .iter()
            .map(|n| {
                self.column(n)
                    .and_then(|c| c.values().get(i))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// All rows in `names` order.
    pub fn rows(&self, names: &[String]) -> Vec<Vec<SqlValue>> {
        (0..self.num_rows()).map(|i| self.row(i, names)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(vec![
            Column::from_values("id", DataType::Int64, [1i64, 2, 3]).unwrap(),
            Column::from_values("name", DataType::String, ["a", "b", "c"]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_rejects_mismatched_values() {
        let err = Column::new("x", DataType::Int64, vec![SqlValue::from("a")]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidColumnValue { .. }));
    }

    #[test]
    fn test_column_accepts_nulls() {
        let col = Column::from_values("x", DataType::Int32, [Some(1i32), None]).unwrap();
        assert_eq!(col.null_count(), 1);
    }

    #[test]
    fn test_frame_rejects_ragged_columns() {
        let result = Frame::new(vec![
            Column::from_values("a", DataType::Int64, [1i64]).unwrap(),
            Column::from_values("b", DataType::Int64, [1i64, 2]).unwrap(),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_rejects_duplicate_names() {
        let result = Frame::new(vec![
            Column::object("a", vec![]),
            Column::object("a", vec![]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_and_reset_index() {
        let mut frame = sample();
        frame.set_index(&["id".to_string()]).unwrap();
        assert_eq!(frame.index_names(), vec!["id"]);
        assert_eq!(frame.column_names(), vec!["name"]);
        assert!(frame.contains("id"));

        frame.reset_index();
        assert!(frame.index().is_empty());
        assert_eq!(frame.column_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_set_index_missing_column() {
        let mut frame = sample();
        let err = frame.set_index(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, FrameError::MissingColumns { .. }));
    }

    #[test]
    fn test_rows_in_requested_order() {
        let frame = sample();
        let rows = frame.rows(&["name".to_string(), "id".to_string()]);
        assert_eq!(rows[1], vec![SqlValue::from("b"), SqlValue::I64(2)]);
    }
}
