//! MERGE and UPDATE statements over caller-supplied identifiers.
//!
//! Table and column names never appear in the emitted text. Each one is
//! bound as a parameter, copied into a `SYSNAME` variable, and quoted with
//! `QUOTENAME` by the engine while it assembles the dynamic statement. The
//! emitted text is therefore a fixed template over numbered variables
//! (`@Match_0`, `@Update_1`, ...) whatever the column names are.

use super::insert::{BoundStatement, TIME_INSERT_COLUMN, TIME_UPDATE_COLUMN};
use crate::core::identifier::{validate_identifier, TableName};
use crate::core::value::SqlValue;
use crate::error::{FrameError, Result};

/// Column sets driving a MERGE.
#[derive(Debug, Clone, Copy)]
pub struct MergeColumns<'a> {
    /// Columns equated between target and staging rows.
    pub match_columns: &'a [String],
    /// Columns overwritten on a match.
    pub update_columns: &'a [String],
    /// Columns written for staging rows with no match.
    pub insert_columns: &'a [String],
    /// Columns whose staged values bound which unmatched target rows are
    /// deleted. Ignored for upserts.
    pub delete_guard: Option<&'a [String]>,
}

/// Options shared by MERGE and UPDATE statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementOptions {
    /// Only update and insert; never delete.
    pub upsert: bool,
    /// Maintain `_time_insert` and `_time_update` with `GETDATE()`.
    pub include_metadata_timestamps: bool,
    /// Allow explicit values for an identity column.
    pub identity_insert: bool,
}

/// Variable declarations and their bound identifier values.
#[derive(Debug, Default)]
struct Binder {
    declarations: Vec<String>,
    params: Vec<SqlValue>,
}

impl Binder {
    fn bind(&mut self, variable: String, identifier: &str) -> Result<String> {
        validate_identifier(identifier)?;
        self.params.push(SqlValue::Text(identifier.to_string()));
        self.declarations.push(format!(
            "DECLARE @{} SYSNAME = @P{};",
            variable,
            self.params.len()
        ));
        Ok(variable)
    }

    fn bind_all(&mut self, prefix: &str, identifiers: &[String]) -> Result<Vec<String>> {
        identifiers
            .iter()
            .enumerate()
            .map(|(i, identifier)| self.bind(format!("{}_{}", prefix, i), identifier))
            .collect()
    }

    /// Bind the target, returning the quoting expression for it.
    fn bind_target(&mut self, target: &TableName) -> Result<String> {
        let table = self.bind("TargetTable".to_string(), &target.name)?;
        match &target.schema {
            Some(schema) => {
                let schema = self.bind("TargetSchema".to_string(), schema)?;
                Ok(format!("QUOTENAME(@{})+'.'+QUOTENAME(@{})", schema, table))
            }
            None => Ok(format!("QUOTENAME(@{})", table)),
        }
    }

    fn finish(self, body: Dynamic) -> BoundStatement {
        let mut sql = String::from("DECLARE @SQLStatement AS NVARCHAR(MAX);\n");
        for declaration in &self.declarations {
            sql.push_str(declaration);
            sql.push('\n');
        }
        sql.push_str("SET @SQLStatement = ");
        sql.push_str(&body.into_expression());
        sql.push_str(";\nEXEC sp_executesql @SQLStatement;");
        BoundStatement {
            sql,
            params: self.params,
        }
    }
}

/// An NVARCHAR expression assembled from fixed literals and quoted variables.
#[derive(Debug, Default)]
struct Dynamic {
    parts: Vec<String>,
}

impl Dynamic {
    /// Append fixed SQL text. Only ever called with text from this module.
    fn text(&mut self, sql: &str) -> &mut Self {
        self.parts.push(format!("'{}'", sql));
        self
    }

    /// Append a raw expression such as a `QUOTENAME` call.
    fn expr(&mut self, expression: &str) -> &mut Self {
        self.parts.push(expression.to_string());
        self
    }

    fn quoted(&mut self, variable: &str) -> &mut Self {
        self.expr(&format!("QUOTENAME(@{})", variable))
    }

    /// `_target.[a]=_source.[a] AND ...`
    fn equalities(&mut self, variables: &[String], separator: &str) -> &mut Self {
        for (i, variable) in variables.iter().enumerate() {
            if i > 0 {
                self.text(separator);
            }
            self.text("_target.")
                .quoted(variable)
                .text("=_source.")
                .quoted(variable);
        }
        self
    }

    /// `[a]=_source.[a], ...`
    fn assignments(&mut self, variables: &[String]) -> &mut Self {
        for (i, variable) in variables.iter().enumerate() {
            if i > 0 {
                self.text(",");
            }
            self.quoted(variable).text("=_source.").quoted(variable);
        }
        self
    }

    fn list(&mut self, variables: &[String], prefix: &str) -> &mut Self {
        for (i, variable) in variables.iter().enumerate() {
            if i > 0 {
                self.text(",");
            }
            if !prefix.is_empty() {
                self.text(prefix);
            }
            self.quoted(variable);
        }
        self
    }

    fn into_expression(self) -> String {
        format!("N{}", self.parts.join("+"))
    }
}

fn require_match_columns(columns: &[String]) -> Result<()> {
    if columns.is_empty() {
        return Err(FrameError::Config(
            "at least one match column is required".to_string(),
        ));
    }
    Ok(())
}

/// Build the MERGE of `staging` into `target`.
///
/// Fails with [`FrameError::Config`] when `upsert` is combined with a
/// non-empty delete guard, and with [`FrameError::InvalidObjectName`] for any
/// identifier `QUOTENAME` would reject.
pub fn build_merge(
    target: &TableName,
    staging: &str,
    columns: MergeColumns<'_>,
    options: StatementOptions,
) -> Result<BoundStatement> {
    let guard = columns.delete_guard.unwrap_or_default();
    if options.upsert && !guard.is_empty() {
        return Err(FrameError::Config(
            "delete_requires can only be specified when upsert is false".to_string(),
        ));
    }
    require_match_columns(columns.match_columns)?;

    let mut binder = Binder::default();
    let target_expr = binder.bind_target(target)?;
    let staging_var = binder.bind("StagingTable".to_string(), staging)?;
    let match_vars = binder.bind_all("Match", columns.match_columns)?;
    let update_vars = binder.bind_all("Update", columns.update_columns)?;
    let insert_vars = binder.bind_all("Insert", columns.insert_columns)?;
    let subset_vars = if options.upsert {
        Vec::new()
    } else {
        binder.bind_all("Subset", guard)?
    };

    let mut body = Dynamic::default();
    if options.identity_insert {
        body.text("SET IDENTITY_INSERT ").expr(&target_expr).text(" ON; ");
    }

    body.text("MERGE ")
        .expr(&target_expr)
        .text(" AS _target USING ")
        .quoted(&staging_var)
        .text(" AS _source ON (")
        .equalities(&match_vars, " AND ")
        .text(")");

    if !update_vars.is_empty() || options.include_metadata_timestamps {
        body.text(" WHEN MATCHED THEN UPDATE SET ");
        if options.include_metadata_timestamps {
            body.text(&format!("[{}]=GETDATE()", TIME_UPDATE_COLUMN));
            if !update_vars.is_empty() {
                body.text(",");
            }
        }
        body.assignments(&update_vars);
    }

    body.text(" WHEN NOT MATCHED THEN INSERT (");
    if options.include_metadata_timestamps {
        body.text(&format!("[{}],", TIME_INSERT_COLUMN));
    }
    body.list(&insert_vars, "").text(") VALUES (");
    if options.include_metadata_timestamps {
        body.text("GETDATE(),");
    }
    body.list(&insert_vars, "_source.").text(")");

    if !options.upsert {
        body.text(" WHEN NOT MATCHED BY SOURCE");
        for variable in &subset_vars {
            body.text(" AND _target.")
                .quoted(variable)
                .text(" IN (SELECT ")
                .quoted(variable)
                .text(" FROM ")
                .quoted(&staging_var)
                .text(")");
        }
        body.text(" THEN DELETE");
    }
    body.text(";");

    if options.identity_insert {
        body.text(" SET IDENTITY_INSERT ").expr(&target_expr).text(" OFF;");
    }

    Ok(binder.finish(body))
}

/// Build an UPDATE of `target` from matching `staging` rows.
///
/// Fails with [`FrameError::Config`] when there is nothing to set.
pub fn build_update(
    target: &TableName,
    staging: &str,
    match_columns: &[String],
    update_columns: &[String],
    include_metadata_timestamps: bool,
) -> Result<BoundStatement> {
    require_match_columns(match_columns)?;
    if update_columns.is_empty() && !include_metadata_timestamps {
        return Err(FrameError::Config(
            "update requires at least one column besides the match columns".to_string(),
        ));
    }

    let mut binder = Binder::default();
    let target_expr = binder.bind_target(target)?;
    let staging_var = binder.bind("StagingTable".to_string(), staging)?;
    let match_vars = binder.bind_all("Match", match_columns)?;
    let update_vars = binder.bind_all("Update", update_columns)?;

    let mut body = Dynamic::default();
    body.text("UPDATE _target SET ");
    if include_metadata_timestamps {
        body.text(&format!("[{}]=GETDATE()", TIME_UPDATE_COLUMN));
        if !update_vars.is_empty() {
            body.text(",");
        }
    }
    body.assignments(&update_vars)
        .text(" FROM ")
        .expr(&target_expr)
        .text(" AS _target INNER JOIN ")
        .quoted(&staging_var)
        .text(" AS _source ON ")
        .equalities(&match_vars, " AND ")
        .text(";");

    Ok(binder.finish(body))
}
