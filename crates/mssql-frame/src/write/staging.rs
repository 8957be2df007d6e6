//! Session temporary table holding a batch for MERGE and UPDATE.

use tracing::{debug, warn};

use super::insert::{BoundStatement, InsertBuilder};
use crate::core::identifier::{escape, quote_mssql, TableName};
use crate::core::traits::Session;
use crate::core::value::SqlValue;
use crate::error::{FrameError, Result};
use crate::schema::model::TableSchema;

/// Longest name SQL Server allows for a local temporary table.
const MAX_TEMP_TABLE_NAME: usize = 116;

const STAGING_PREFIX: &str = "#__stage_";

/// Staging table name for a target table.
pub fn staging_name(target: &TableName) -> String {
    format!("{}{}", STAGING_PREFIX, target.name.trim_start_matches('#'))
        .chars()
        .take(MAX_TEMP_TABLE_NAME)
        .collect()
}

/// A created staging table. Call [`StagingTable::drop`] on every exit path.
#[derive(Debug)]
pub struct StagingTable {
    name: String,
    quoted: String,
    columns: Vec<String>,
}

impl StagingTable {
    /// Create the staging table for `columns` of `schema`.
    ///
    /// Column definitions come from the schema without identity or
    /// defaults, and character columns take the database collation rather
    /// than tempdb's. A leftover table of the same name is replaced.
    pub async fn create<S>(session: &mut S, schema: &TableSchema, columns: &[String]) -> Result<Self>
    where
        S: Session + ?Sized,
    {
        let name = staging_name(&schema.table);
        let quoted = escape(&name)?;

        let mut definitions = Vec::with_capacity(columns.len());
        for column in columns {
            let col = schema.column(column).ok_or_else(|| {
                FrameError::missing_columns(schema.table.to_string(), vec![column.clone()])
            })?;
            let collation = if col.is_character() {
                " COLLATE DATABASE_DEFAULT"
            } else {
                ""
            };
            definitions.push(format!(
                "{} {}{} NULL",
                quote_mssql(column)?,
                col.type_definition(),
                collation
            ));
        }

        let sql = format!(
            "DROP TABLE IF EXISTS {0}; CREATE TABLE {0} ({1});",
            quoted,
            definitions.join(", ")
        );
        session.execute_batch(&sql).await?;
        debug!("Created staging table {} for {}", name, schema.table);

        Ok(Self {
            name,
            quoted,
            columns: columns.to_vec(),
        })
    }

    /// Unquoted name, as bound into MERGE and UPDATE statements.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// INSERT statements loading `rows` into the staging table.
    pub fn insert_statements(
        &self,
        rows: &[Vec<SqlValue>],
        max_rows: usize,
    ) -> Result<Vec<BoundStatement>> {
        InsertBuilder::new(self.quoted.clone(), &self.columns)
            .max_rows(max_rows)
            .build(rows)
    }

    /// Drop the staging table.
    pub async fn drop<S>(self, session: &mut S) -> Result<()>
    where
        S: Session + ?Sized,
    {
        session
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", self.quoted))
            .await?;
        debug!("Dropped staging table {}", self.name);
        Ok(())
    }

    /// Drop the staging table after a failure, logging rather than
    /// returning a second error.
    pub async fn discard<S>(self, session: &mut S)
    where
        S: Session + ?Sized,
    {
        let name = self.name.clone();
        if let Err(e) = self.drop(session).await {
            warn!("Failed to drop staging table {}: {}", name, e);
        }
    }
}
