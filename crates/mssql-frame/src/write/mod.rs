//! Write operations: insert, merge and update.
//!
//! Every operation describes the target table, coerces the frame to it,
//! rounds values to stored precision and only then issues statements. A
//! validation failure therefore never leaves a partial write behind. Writes
//! are committed on success and rolled back on failure.

pub mod insert;
pub mod merge;
pub mod staging;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WriteConfig;
use crate::core::frame::Frame;
use crate::core::traits::Session;
use crate::error::{FrameError, Result};
use crate::schema::catalog::describe_frame;
use crate::schema::model::TableSchema;
use crate::schema::precision::{prepare, PrecisionWarning, Prepared};

use insert::{
    BoundStatement, InsertBuilder, MAX_ROWS_PER_STATEMENT, TIME_INSERT_COLUMN, TIME_UPDATE_COLUMN,
};
use merge::{build_merge, build_update, MergeColumns, StatementOptions};
use staging::{staging_name, StagingTable};

/// Options shared by every write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Maintain `_time_insert` and `_time_update` with the server time.
    pub include_metadata_timestamps: bool,
    /// Row limit for each INSERT statement.
    pub max_rows_per_statement: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            include_metadata_timestamps: false,
            max_rows_per_statement: MAX_ROWS_PER_STATEMENT,
        }
    }
}

impl From<&WriteConfig> for WriteOptions {
    fn from(config: &WriteConfig) -> Self {
        Self {
            include_metadata_timestamps: config.include_metadata_timestamps,
            max_rows_per_statement: config.max_rows_per_statement,
        }
    }
}

/// Options for [`merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Columns identifying matching rows; the primary key when `None`.
    pub match_columns: Option<Vec<String>>,
    /// Update and insert only, never delete.
    pub upsert: bool,
    /// Delete unmatched target rows only where these columns' values occur
    /// in the batch. Not allowed together with `upsert`.
    pub delete_requires: Option<Vec<String>>,
    pub write: WriteOptions,
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    /// The frame as stored: coerced, rounded and indexed by primary key.
    pub frame: Frame,
    /// Precision lost while rounding.
    pub warnings: Vec<PrecisionWarning>,
    pub rows_affected: u64,
}

impl WriteOutcome {
    fn new(prepared: Prepared, rows_affected: u64) -> Self {
        Self {
            frame: prepared.frame,
            warnings: prepared.warnings,
            rows_affected,
        }
    }
}

/// Insert every row of `frame` into `table_name`.
pub async fn insert<S>(
    session: &mut S,
    table_name: &str,
    frame: Frame,
    options: &WriteOptions,
) -> Result<WriteOutcome>
where
    S: Session + ?Sized,
{
    let required: &[&str] = if options.include_metadata_timestamps {
        &[TIME_INSERT_COLUMN]
    } else {
        &[]
    };
    let (schema, frame) = describe_frame(session, table_name, frame, required).await?;
    let prepared = prepare(&schema, frame)?;

    let statements = InsertBuilder::new(schema.table.quoted()?, &prepared.columns)
        .stamp_insert_time(options.include_metadata_timestamps)
        .identity_insert(has_identity(&schema, &prepared.columns))
        .max_rows(options.max_rows_per_statement)
        .build(&prepared.rows)?;

    let rows_affected = match execute_all(session, &statements).await {
        Ok(rows) => rows,
        Err(e) => {
            rollback_quietly(session).await;
            return Err(e);
        }
    };
    session.commit().await?;

    info!("Inserted {} rows into {}", rows_affected, schema.table);
    Ok(WriteOutcome::new(prepared, rows_affected))
}

/// Synchronize `table_name` with `frame` in one MERGE statement.
///
/// Matching rows are updated and missing rows inserted. Unless `upsert` is
/// set, target rows absent from the batch are deleted, limited by
/// `delete_requires` when given.
pub async fn merge<S>(
    session: &mut S,
    table_name: &str,
    frame: Frame,
    options: &MergeOptions,
) -> Result<WriteOutcome>
where
    S: Session + ?Sized,
{
    let guard = options.delete_requires.clone().unwrap_or_default();
    if options.upsert && !guard.is_empty() {
        return Err(FrameError::Config(
            "delete_requires can only be specified when upsert is false".to_string(),
        ));
    }

    let timestamps = options.write.include_metadata_timestamps;
    let mut required = guard.clone();
    if timestamps {
        required.push(TIME_UPDATE_COLUMN.to_string());
        required.push(TIME_INSERT_COLUMN.to_string());
    }

    let (schema, frame) = describe_frame(session, table_name, frame, required.as_slice()).await?;
    let match_columns = resolve_match_columns(&schema, &frame, options.match_columns.as_deref())?;
    require_in_frame(&frame, &guard)?;

    let prepared = prepare(&schema, frame)?;
    let update_columns = update_columns(&schema, &prepared.columns, &match_columns);

    let statement = build_merge(
        &schema.table,
        &staging_name(&schema.table),
        MergeColumns {
            match_columns: &match_columns,
            update_columns: &update_columns,
            insert_columns: &prepared.columns,
            delete_guard: (!options.upsert).then_some(guard.as_slice()),
        },
        StatementOptions {
            upsert: options.upsert,
            include_metadata_timestamps: timestamps,
            identity_insert: has_identity(&schema, &prepared.columns),
        },
    )?;

    let rows_affected = run_staged(
        session,
        &schema,
        &prepared,
        &statement,
        options.write.max_rows_per_statement,
    )
    .await?;

    info!(
        "Merged {} rows into {} ({} rows affected)",
        prepared.rows.len(),
        schema.table,
        rows_affected
    );
    Ok(WriteOutcome::new(prepared, rows_affected))
}

/// Update rows of `table_name` matching `frame` on `match_columns`, or on
/// the primary key when `None`.
///
/// Every other frame column is overwritten. Rows without a match are
/// ignored.
pub async fn update<S>(
    session: &mut S,
    table_name: &str,
    frame: Frame,
    match_columns: Option<&[String]>,
    options: &WriteOptions,
) -> Result<WriteOutcome>
where
    S: Session + ?Sized,
{
    let required: &[&str] = if options.include_metadata_timestamps {
        &[TIME_UPDATE_COLUMN]
    } else {
        &[]
    };
    let (schema, frame) = describe_frame(session, table_name, frame, required).await?;
    let match_columns = resolve_match_columns(&schema, &frame, match_columns)?;

    let prepared = prepare(&schema, frame)?;
    let update_columns = update_columns(&schema, &prepared.columns, &match_columns);

    let statement = build_update(
        &schema.table,
        &staging_name(&schema.table),
        &match_columns,
        &update_columns,
        options.include_metadata_timestamps,
    )?;

    let rows_affected = run_staged(
        session,
        &schema,
        &prepared,
        &statement,
        options.max_rows_per_statement,
    )
    .await?;

    info!("Updated {} rows in {}", rows_affected, schema.table);
    Ok(WriteOutcome::new(prepared, rows_affected))
}

/// Explicit match columns, or the primary key.
fn resolve_match_columns(
    schema: &TableSchema,
    frame: &Frame,
    explicit: Option<&[String]>,
) -> Result<Vec<String>> {
    let columns = match explicit {
        Some(columns) if !columns.is_empty() => columns.to_vec(),
        _ => schema.primary_key(),
    };
    if columns.is_empty() {
        return Err(FrameError::UndefinedPrimaryKey(schema.table.to_string()));
    }
    require_in_frame(frame, &columns)?;
    Ok(columns)
}

fn require_in_frame(frame: &Frame, columns: &[String]) -> Result<()> {
    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !frame.contains(c))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FrameError::missing_columns("frame", missing))
    }
}

/// Frame columns other than the match columns, excluding identity columns.
fn update_columns(schema: &TableSchema, columns: &[String], match_columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| !match_columns.contains(c))
        .filter(|c| !schema.column(c).is_some_and(|s| s.is_identity))
        .cloned()
        .collect()
}

fn has_identity(schema: &TableSchema, columns: &[String]) -> bool {
    columns
        .iter()
        .any(|c| schema.column(c).is_some_and(|s| s.is_identity))
}

async fn execute_all<S>(session: &mut S, statements: &[BoundStatement]) -> Result<u64>
where
    S: Session + ?Sized,
{
    let mut total = 0u64;
    for statement in statements {
        debug!("Executing statement with {} parameters", statement.params.len());
        total += session.execute(&statement.sql, &statement.params).await?;
    }
    Ok(total)
}

async fn rollback_quietly<S>(session: &mut S)
where
    S: Session + ?Sized,
{
    if let Err(e) = session.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

/// Load the batch into a staging table, run `statement` against it, and
/// drop the staging table whatever the outcome.
async fn run_staged<S>(
    session: &mut S,
    schema: &TableSchema,
    prepared: &Prepared,
    statement: &BoundStatement,
    max_rows: usize,
) -> Result<u64>
where
    S: Session + ?Sized,
{
    let staging = StagingTable::create(session, schema, &prepared.columns).await?;

    let result = async {
        let loads = staging.insert_statements(&prepared.rows, max_rows)?;
        let staged = execute_all(session, &loads).await?;
        debug!("Staged {} rows in {}", staged, staging.name());
        session.execute(&statement.sql, &statement.params).await
    }
    .await;

    match result {
        Ok(rows) => {
            if let Err(e) = staging.drop(session).await {
                rollback_quietly(session).await;
                return Err(e);
            }
            session.commit().await?;
            Ok(rows)
        }
        Err(e) => {
            rollback_quietly(session).await;
            staging.discard(session).await;
            Err(e)
        }
    }
}
