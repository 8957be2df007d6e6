//! In-memory session shared by the integration tests.
//!
//! Tables are registered up front with their catalog rows. INSERT statements
//! against a registered table store rows so they can be read back, rows
//! inserted anywhere else are kept as staging tables, and a MERGE is applied
//! from its staging table to the target. Every statement, batch and
//! transaction call is recorded in order.

#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use mssql_frame::core::{ColumnRow, PrimaryKeyRow, ResultSet, Session};
use mssql_frame::{FrameError, Result, SqlValue, TableName};

/// Value stored for `GETDATE()`.
pub fn server_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub columns: Vec<ColumnRow>,
    pub primary_key: Vec<PrimaryKeyRow>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl MockTable {
    /// Columns as `(name, type, size, digits, nullable)`.
    pub fn new(columns: &[(&str, &str, i32, i32, bool)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, type_name, size, digits, nullable)| ColumnRow {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                    column_size: *size,
                    decimal_digits: *digits,
                    is_nullable: *nullable,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<SqlValue>>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns
            .iter()
            .enumerate()
            .map(|(i, column)| PrimaryKeyRow {
                column: column.to_string(),
                key_seq: i as i32 + 1,
                constraint_name: "PK_test".to_string(),
            })
            .collect();
        self
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute { sql: String, params: Vec<SqlValue> },
    Batch(String),
    Query(String),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct MockSession {
    tables: HashMap<String, MockTable>,
    pub calls: Vec<Call>,
    /// Fail any statement whose text contains this.
    pub fail_when: Option<String>,
    /// Returned by the next query instead of table contents.
    pub canned: Option<ResultSet>,
    staged_rows: u64,
    /// Staging tables by quoted name: column names and rows.
    staging: HashMap<String, (Vec<String>, Vec<Vec<SqlValue>>)>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under a `table` or `schema.table` name.
    pub fn with_table(mut self, name: &str, table: MockTable) -> Self {
        let key = TableName::parse(name).unwrap().quoted().unwrap();
        self.tables.insert(key, table);
        self
    }

    pub fn table(&self, name: &str) -> &MockTable {
        let key = TableName::parse(name).unwrap().quoted().unwrap();
        &self.tables[&key]
    }

    pub fn executed(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Execute { sql, .. } => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn batches(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Batch(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_writes(&self) -> bool {
        self.calls
            .iter()
            .any(|c| matches!(c, Call::Execute { .. } | Call::Batch(_)))
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match &self.fail_when {
            Some(needle) if sql.contains(needle.as_str()) => Err(FrameError::Database(
                tiberius::error::Error::Protocol("injected failure".into()),
            )),
            _ => Ok(()),
        }
    }

    fn apply_insert(&mut self, sql: &str, params: &[SqlValue]) -> u64 {
        let Some((target, columns)) = parse_insert(sql) else {
            return 0;
        };
        let stamped = columns.first().map(String::as_str) == Some("_time_insert");
        let per_row = columns.len() - usize::from(stamped);
        let row_count = if per_row == 0 { 0 } else { params.len() / per_row };

        match self.tables.get_mut(&target) {
            Some(table) => {
                for chunk in params.chunks(per_row.max(1)).take(row_count) {
                    let mut row = vec![SqlValue::Null; table.columns.len()];
                    let mut values = chunk.iter();
                    for column in &columns {
                        let value = if stamped && column == "_time_insert" {
                            SqlValue::DateTime(server_time())
                        } else {
                            values.next().cloned().unwrap_or_default()
                        };
                        if let Some(pos) = table.position(column) {
                            row[pos] = value;
                        }
                    }
                    table.rows.push(row);
                }
            }
            None => {
                let (staged_columns, rows) = self
                    .staging
                    .entry(target)
                    .or_insert_with(|| (columns.clone(), Vec::new()));
                *staged_columns = columns.clone();
                rows.extend(
                    params
                        .chunks(per_row.max(1))
                        .take(row_count)
                        .map(<[SqlValue]>::to_vec),
                );
                self.staged_rows += row_count as u64;
            }
        }
        row_count as u64
    }

    /// Apply a MERGE from its staging table to the target rows.
    ///
    /// Returns updated plus inserted plus deleted rows.
    fn apply_merge(&mut self, sql: &str, params: &[SqlValue]) -> u64 {
        let bound = bound_identifiers(sql, params);
        let list = |prefix: &str| -> Vec<String> {
            (0..)
                .map_while(|i| bound.get(&format!("{}_{}", prefix, i)).cloned())
                .collect()
        };
        let match_columns = list("Match");
        let update_columns = list("Update");
        let insert_columns = list("Insert");
        let guard_columns = list("Subset");

        let (Some(name), Some(staging)) = (bound.get("TargetTable"), bound.get("StagingTable"))
        else {
            return 0;
        };
        let target = TableName {
            schema: bound.get("TargetSchema").cloned(),
            name: name.clone(),
        }
        .quoted()
        .unwrap();
        let (staged_columns, staged) = self
            .staging
            .get(&format!("[{}]", staging.replace(']', "]]")))
            .cloned()
            .unwrap_or_default();
        let Some(table) = self.tables.get_mut(&target) else {
            return 0;
        };

        let staged_value = |row: &[SqlValue], column: &str| -> SqlValue {
            staged_columns
                .iter()
                .position(|c| c == column)
                .map(|p| row[p].clone())
                .unwrap_or_default()
        };
        let updates = sql.contains("WHEN MATCHED THEN UPDATE");
        let deletes = sql.contains("WHEN NOT MATCHED BY SOURCE");

        let mut affected = 0;
        let mut matched = vec![false; table.rows.len()];
        let mut inserted = Vec::new();
        for source in &staged {
            let hit = (0..table.rows.len()).find(|&r| {
                match_columns.iter().all(|c| {
                    table
                        .position(c)
                        .is_some_and(|p| table.rows[r][p] == staged_value(source, c))
                })
            });
            match hit {
                Some(r) => {
                    matched[r] = true;
                    if !updates {
                        continue;
                    }
                    for column in &update_columns {
                        if let Some(p) = table.position(column) {
                            table.rows[r][p] = staged_value(source, column);
                        }
                    }
                    if sql.contains("[_time_update]=GETDATE()") {
                        if let Some(p) = table.position("_time_update") {
                            table.rows[r][p] = SqlValue::DateTime(server_time());
                        }
                    }
                    affected += 1;
                }
                None => {
                    let mut row = vec![SqlValue::Null; table.columns.len()];
                    for column in &insert_columns {
                        if let Some(p) = table.position(column) {
                            row[p] = staged_value(source, column);
                        }
                    }
                    if sql.contains("[_time_insert],") {
                        if let Some(p) = table.position("_time_insert") {
                            row[p] = SqlValue::DateTime(server_time());
                        }
                    }
                    inserted.push(row);
                    affected += 1;
                }
            }
        }

        if deletes {
            let positions: Vec<(String, Option<usize>)> = guard_columns
                .iter()
                .map(|c| (c.clone(), table.position(c)))
                .collect();
            let mut kept = Vec::with_capacity(table.rows.len());
            for (row, was_matched) in table.rows.drain(..).zip(matched) {
                let guarded = positions.iter().all(|(column, p)| {
                    p.is_some_and(|p| staged.iter().any(|s| staged_value(s, column) == row[p]))
                });
                if was_matched || !guarded {
                    kept.push(row);
                } else {
                    affected += 1;
                }
            }
            table.rows = kept;
        }
        table.rows.extend(inserted);
        affected
    }

    fn select(&self, sql: &str) -> ResultSet {
        let words: Vec<&str> = sql.split_whitespace().collect();
        let Some(from) = words.iter().position(|w| w.eq_ignore_ascii_case("FROM")) else {
            return ResultSet::default();
        };
        let Some(table) = words.get(from + 1).and_then(|t| self.tables.get(*t)) else {
            return ResultSet::default();
        };

        let selected = words[1..from].join(" ");
        let columns: Vec<String> = if selected == "*" {
            table.column_names()
        } else {
            selected.split(',').map(|c| unbracket(c.trim())).collect()
        };
        let rows = table
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| table.position(c).map(|p| row[p].clone()).unwrap_or_default())
                    .collect()
            })
            .collect();
        ResultSet { columns, rows }
    }
}

fn unbracket(name: &str) -> String {
    name.strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .unwrap_or(name)
        .replace("]]", "]")
}

/// `SYSNAME` variables declared by a dynamic statement and their bound values.
fn bound_identifiers(sql: &str, params: &[SqlValue]) -> HashMap<String, String> {
    sql.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("DECLARE @")?;
            let (name, placeholder) = rest.split_once(" SYSNAME = @P")?;
            let index: usize = placeholder.trim_end_matches(';').parse().ok()?;
            match params.get(index.checked_sub(1)?)? {
                SqlValue::Text(value) => Some((name.to_string(), value.clone())),
                _ => None,
            }
        })
        .collect()
}

/// Target and column names of the first INSERT in `sql`.
fn parse_insert(sql: &str) -> Option<(String, Vec<String>)> {
    let start = sql.find("INSERT INTO ")? + "INSERT INTO ".len();
    let (target, rest) = sql[start..].split_once(" (")?;
    let (columns, _) = rest.split_once(") VALUES ")?;
    Some((
        target.to_string(),
        columns.split(", ").map(unbracket).collect(),
    ))
}

#[async_trait]
impl Session for MockSession {
    async fn introspect_columns(&mut self, table: &TableName) -> Result<Vec<ColumnRow>> {
        Ok(self
            .tables
            .get(&table.quoted()?)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn introspect_primary_key(&mut self, table: &TableName) -> Result<Vec<PrimaryKeyRow>> {
        Ok(self
            .tables
            .get(&table.quoted()?)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.calls.push(Call::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check_failure(sql)?;

        if sql.contains("MERGE ") {
            self.staged_rows = 0;
            Ok(self.apply_merge(sql, params))
        } else if sql.contains("INSERT INTO ") {
            Ok(self.apply_insert(sql, params))
        } else {
            Ok(std::mem::take(&mut self.staged_rows))
        }
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.calls.push(Call::Batch(sql.to_string()));
        self.check_failure(sql)?;
        if let Some(rest) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            if let Some((name, _)) = rest.split_once(';') {
                self.staging.remove(name);
            }
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<ResultSet> {
        self.calls.push(Call::Query(sql.to_string()));
        self.check_failure(sql)?;
        match self.canned.take() {
            Some(result) => Ok(result),
            None => Ok(self.select(sql)),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.calls.push(Call::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.calls.push(Call::Rollback);
        Ok(())
    }
}
