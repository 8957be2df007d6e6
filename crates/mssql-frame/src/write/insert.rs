//! Chunked multi-row INSERT statements.

use crate::core::identifier::quote_mssql;
use crate::core::value::SqlValue;
use crate::error::Result;

/// Most parameters the engine accepts in one statement.
pub const MAX_PARAMETERS: usize = 2100;

/// Most row constructors the engine accepts in one VALUES clause.
pub const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Column filled with the server time when a row is inserted.
pub const TIME_INSERT_COLUMN: &str = "_time_insert";

/// Column filled with the server time when a row is updated.
pub const TIME_UPDATE_COLUMN: &str = "_time_update";

/// One parameterized statement with its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Rows per INSERT so that neither the parameter nor the row limit is exceeded.
pub fn rows_per_statement(columns: usize, limit: usize) -> usize {
    let by_parameters = if columns == 0 {
        MAX_ROWS_PER_STATEMENT
    } else {
        MAX_PARAMETERS / columns
    };
    by_parameters.min(limit).clamp(1, MAX_ROWS_PER_STATEMENT)
}

/// Builder for INSERT statements against one table.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    target: String,
    columns: Vec<String>,
    stamp_insert_time: bool,
    identity_insert: bool,
    max_rows: usize,
}

impl InsertBuilder {
    /// `target` is an already quoted table name.
    pub fn new(target: impl Into<String>, columns: &[String]) -> Self {
        Self {
            target: target.into(),
            columns: columns.to_vec(),
            stamp_insert_time: false,
            identity_insert: false,
            max_rows: MAX_ROWS_PER_STATEMENT,
        }
    }

    /// Prepend `_time_insert` filled with `GETDATE()` to every row.
    pub fn stamp_insert_time(mut self, enabled: bool) -> Self {
        self.stamp_insert_time = enabled;
        self
    }

    /// Wrap each statement in `SET IDENTITY_INSERT ... ON/OFF`.
    pub fn identity_insert(mut self, enabled: bool) -> Self {
        self.identity_insert = enabled;
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Split `rows` into statements with `@P1..@Pn` placeholders.
    ///
    /// Each row must hold one value per column, in column order.
    pub fn build(&self, rows: &[Vec<SqlValue>]) -> Result<Vec<BoundStatement>> {
        if rows.is_empty() || (self.columns.is_empty() && !self.stamp_insert_time) {
            return Ok(Vec::new());
        }

        let mut col_list = Vec::with_capacity(self.columns.len() + 1);
        if self.stamp_insert_time {
            col_list.push(quote_mssql(TIME_INSERT_COLUMN)?);
        }
        for column in &self.columns {
            col_list.push(quote_mssql(column)?);
        }
        let col_str = col_list.join(", ");

        let chunk_size = rows_per_statement(self.columns.len(), self.max_rows);
        let mut statements = Vec::with_capacity(rows.len().div_ceil(chunk_size));

        for chunk in rows.chunks(chunk_size) {
            let mut value_groups = Vec::with_capacity(chunk.len());
            let mut param_idx = 1;
            for _ in chunk {
                let mut placeholders = Vec::with_capacity(col_list.len());
                if self.stamp_insert_time {
                    placeholders.push("GETDATE()".to_string());
                }
                for _ in &self.columns {
                    placeholders.push(format!("@P{}", param_idx));
                    param_idx += 1;
                }
                value_groups.push(format!("({})", placeholders.join(", ")));
            }

            let insert = format!(
                "INSERT INTO {} ({}) VALUES {};",
                self.target,
                col_str,
                value_groups.join(", ")
            );
            let sql = if self.identity_insert {
                format!(
                    "SET IDENTITY_INSERT {0} ON; {1} SET IDENTITY_INSERT {0} OFF;",
                    self.target, insert
                )
            } else {
                insert
            };

            statements.push(BoundStatement {
                sql,
                params: chunk.iter().flatten().cloned().collect(),
            });
        }

        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize, cols: usize) -> Vec<Vec<SqlValue>> {
        (0..n)
            .map(|i| (0..cols).map(|c| SqlValue::I64((i * cols + c) as i64)).collect())
            .collect()
    }

    fn names(cols: usize) -> Vec<String> {
        (0..cols).map(|c| format!("c{}", c)).collect()
    }

    #[test]
    fn test_rows_per_statement_limits() {
        assert_eq!(rows_per_statement(1, 1000), 1000);
        assert_eq!(rows_per_statement(3, 1000), 700);
        assert_eq!(rows_per_statement(3000, 1000), 1);
        assert_eq!(rows_per_statement(2, 10), 10);
        assert_eq!(rows_per_statement(0, 1000), 1000);
    }

    #[test]
    fn test_single_statement() {
        let stmts = InsertBuilder::new("[dbo].[t]", &names(2)).build(&rows(2, 2)).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(
            stmts[0].sql,
            "INSERT INTO [dbo].[t] ([c0], [c1]) VALUES (@P1, @P2), (@P3, @P4);"
        );
        assert_eq!(stmts[0].params.len(), 4);
        assert_eq!(stmts[0].params[3], SqlValue::I64(3));
    }

    #[test]
    fn test_chunks_restart_parameter_numbering() {
        let stmts = InsertBuilder::new("[t]", &names(1))
            .max_rows(2)
            .build(&rows(3, 1))
            .unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].sql, "INSERT INTO [t] ([c0]) VALUES (@P1);");
        assert_eq!(stmts[1].params, vec![SqlValue::I64(2)]);
    }

    #[test]
    fn test_insert_time_is_server_generated() {
        let stmts = InsertBuilder::new("[t]", &names(1))
            .stamp_insert_time(true)
            .build(&rows(1, 1))
            .unwrap();
        assert_eq!(
            stmts[0].sql,
            "INSERT INTO [t] ([_time_insert], [c0]) VALUES (GETDATE(), @P1);"
        );
        assert_eq!(stmts[0].params.len(), 1);
    }

    #[test]
    fn test_identity_insert_wrapping() {
        let stmts = InsertBuilder::new("[t]", &names(1))
            .identity_insert(true)
            .build(&rows(1, 1))
            .unwrap();
        assert!(stmts[0].sql.starts_with("SET IDENTITY_INSERT [t] ON; INSERT INTO [t]"));
        assert!(stmts[0].sql.ends_with("SET IDENTITY_INSERT [t] OFF;"));
    }

    #[test]
    fn test_column_names_are_escaped() {
        let stmts = InsertBuilder::new("[t]", &["a]b".to_string()])
            .build(&rows(1, 1))
            .unwrap();
        assert!(stmts[0].sql.contains("([a]]b])"));
    }

    #[test]
    fn test_no_rows_no_statements() {
        assert!(InsertBuilder::new("[t]", &names(1)).build(&[]).unwrap().is_empty());
    }
}
