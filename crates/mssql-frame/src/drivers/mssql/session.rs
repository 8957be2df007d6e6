//! Tiberius-backed [`Session`].

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::identifier::TableName;
use crate::core::traits::{ColumnRow, PrimaryKeyRow, ResultSet, Session};
use crate::core::value::{format_time_of_day, SqlValue};
use crate::error::{FrameError, Result};
use crate::schema::precision::round_millis;

/// Columns of a table in ordinal order. `{catalog}` is `tempdb.` for
/// temporary tables. Character lengths are reported in characters.
const COLUMNS_QUERY: &str = r#"
    SELECT
        c.name,
        t.name + CASE WHEN c.is_identity = 1 THEN ' identity' ELSE '' END,
        CAST(CASE
            WHEN t.name IN ('nchar', 'nvarchar') AND c.max_length > 0 THEN c.max_length / 2
            WHEN t.name IN ('decimal', 'numeric') THEN c.precision
            ELSE c.max_length
        END AS INT),
        CAST(c.scale AS INT),
        CAST(c.is_nullable AS INT)
    FROM {catalog}sys.columns c
    JOIN {catalog}sys.types t ON t.user_type_id = c.system_type_id
    WHERE c.object_id = OBJECT_ID(@P1)
    ORDER BY c.column_id
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT
        col.name,
        CAST(ic.key_ordinal AS INT),
        i.name
    FROM {catalog}sys.indexes i
    JOIN {catalog}sys.index_columns ic
        ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN {catalog}sys.columns col
        ON col.object_id = ic.object_id AND col.column_id = ic.column_id
    WHERE i.is_primary_key = 1 AND i.object_id = OBJECT_ID(@P1)
    ORDER BY ic.key_ordinal
"#;

fn with_catalog(template: &str, table: &TableName) -> String {
    let catalog = table
        .catalog()
        .map(|c| format!("{}.", c))
        .unwrap_or_default();
    template.replace("{catalog}", &catalog)
}

fn build_config(config: &ConnectionConfig) -> Config {
    let mut tiberius_config = Config::new();
    tiberius_config.host(&config.host);
    tiberius_config.port(config.port);
    tiberius_config.database(&config.database);
    tiberius_config.authentication(AuthMethod::sql_server(&config.user, &config.password));

    if let Some(name) = &config.application_name {
        tiberius_config.application_name(name);
    }

    if config.encryption_required() {
        if config.trust_server_cert {
            tiberius_config.trust_cert();
        }
        tiberius_config.encryption(EncryptionLevel::Required);
    } else {
        tiberius_config.encryption(EncryptionLevel::NotSupported);
    }

    tiberius_config
}

/// A single SQL Server connection.
///
/// A transaction is opened by the first parameterized statement and ended
/// by [`Session::commit`] or [`Session::rollback`]. Unparameterized batches
/// run outside of it until then.
pub struct MssqlSession {
    client: Client<Compat<TcpStream>>,
    in_transaction: bool,
}

impl MssqlSession {
    /// Connect using SQL Server authentication.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let tiberius_config = build_config(config);
        let tcp = TcpStream::connect(tiberius_config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tiberius_config, tcp.compat_write()).await?;
        info!(
            "Connected to {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            client,
            in_transaction: false,
        })
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&mut self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    async fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.client
                .simple_query("BEGIN TRANSACTION")
                .await?
                .into_results()
                .await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn finish(&mut self, sql: &str) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.simple_query(sql).await?.into_results().await?;
        }
        Ok(())
    }
}

/// Map a value to a tiberius parameter.
///
/// Times of day are bound as text since tiberius has no duration type.
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::U8(i) => Box::new(*i),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(format_time_of_day(*t, 7)),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
    }
}

/// Convert one result cell to a value.
fn column_data_to_sql_value(column: &str, data: &ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::Bit(v) => SqlValue::from(*v),
        ColumnData::U8(v) => SqlValue::from(*v),
        ColumnData::I16(v) => SqlValue::from(*v),
        ColumnData::I32(v) => SqlValue::from(*v),
        ColumnData::I64(v) => SqlValue::from(*v),
        ColumnData::F32(v) => v.map_or(SqlValue::Null, SqlValue::F32),
        ColumnData::F64(v) => SqlValue::from(*v),
        ColumnData::String(v) => SqlValue::from(v.as_ref().map(|s| s.to_string())),
        ColumnData::Guid(v) => SqlValue::from(v.map(|g| g.to_string())),
        ColumnData::Numeric(_) => SqlValue::from(Decimal::from_sql(data)?),
        ColumnData::Date(_) => SqlValue::from(NaiveDate::from_sql(data)?),
        ColumnData::Time(_) => SqlValue::from(
            NaiveTime::from_sql(data)?.map(|t| t.signed_duration_since(NaiveTime::default())),
        ),
        ColumnData::DateTime(_) => SqlValue::from(NaiveDateTime::from_sql(data)?.map(round_millis)),
        ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            SqlValue::from(NaiveDateTime::from_sql(data)?)
        }
        ColumnData::DateTimeOffset(_) => SqlValue::from(DateTime::<FixedOffset>::from_sql(data)?),
        _ => {
            return Err(FrameError::invalid_value(
                vec![column.to_string()],
                "result column type is not supported",
            ))
        }
    };
    Ok(value)
}

fn row_to_values(columns: &[String], row: Row) -> Result<Vec<SqlValue>> {
    row.into_iter()
        .enumerate()
        .map(|(i, data)| {
            let name = columns.get(i).map(String::as_str).unwrap_or_default();
            column_data_to_sql_value(name, &data)
        })
        .collect()
}

#[async_trait]
impl Session for MssqlSession {
    async fn introspect_columns(&mut self, table: &TableName) -> Result<Vec<ColumnRow>> {
        let sql = with_catalog(COLUMNS_QUERY, table);
        let object = table.object_id_name()?;
        let rows = self
            .client
            .query(sql.as_str(), &[&object])
            .await?
            .into_first_result()
            .await?;

        let columns: Vec<ColumnRow> = rows
            .iter()
            .map(|row| ColumnRow {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                type_name: row.get::<&str, _>(1).unwrap_or_default().to_string(),
                column_size: row.get::<i32, _>(2).unwrap_or(0),
                decimal_digits: row.get::<i32, _>(3).unwrap_or(0),
                is_nullable: row.get::<i32, _>(4).unwrap_or(0) == 1,
            })
            .collect();

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn introspect_primary_key(&mut self, table: &TableName) -> Result<Vec<PrimaryKeyRow>> {
        let sql = with_catalog(PRIMARY_KEY_QUERY, table);
        let object = table.object_id_name()?;
        let rows = self
            .client
            .query(sql.as_str(), &[&object])
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .map(|row| PrimaryKeyRow {
                column: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                key_seq: row.get::<i32, _>(1).unwrap_or(0),
                constraint_name: row.get::<&str, _>(2).unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.begin_if_needed().await?;

        let boxed: Vec<Box<dyn ToSql>> = params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

        debug!("Executing statement ({} parameters)", params.len());
        let result = self.client.execute(sql, &param_refs).await?;
        Ok(result.total())
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        debug!("Executing batch: {}", sql);
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet> {
        let boxed: Vec<Box<dyn ToSql>> = params.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = boxed.iter().map(|p| p.as_ref()).collect();

        let mut stream = self.client.query(sql, &param_refs).await?;
        let columns: Vec<String> = stream
            .columns()
            .await?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream.into_first_result().await?;

        let rows = rows
            .into_iter()
            .map(|row| row_to_values(&columns, row))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultSet { columns, rows })
    }

    async fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.finish("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_prefix_for_temporary_tables() {
        let temp = TableName::parse("#scratch").unwrap();
        assert!(with_catalog(COLUMNS_QUERY, &temp).contains("FROM tempdb.sys.columns c"));

        let regular = TableName::parse("dbo.orders").unwrap();
        let sql = with_catalog(PRIMARY_KEY_QUERY, &regular);
        assert!(sql.contains("FROM sys.indexes i"));
        assert!(!sql.contains("{catalog}"));
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            column_data_to_sql_value("a", &ColumnData::I32(Some(7))).unwrap(),
            SqlValue::I32(7)
        );
        assert_eq!(
            column_data_to_sql_value("a", &ColumnData::I64(None)).unwrap(),
            SqlValue::Null
        );
        assert_eq!(
            column_data_to_sql_value("a", &ColumnData::String(Some("x".into()))).unwrap(),
            SqlValue::from("x")
        );
    }

    #[test]
    fn test_decode_datetime_restores_milliseconds() {
        let midnight = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        for (fragments, millis) in [(0u32, 0i64), (1, 3), (2, 7), (3, 10), (299, 997)] {
            let data = ColumnData::DateTime(Some(tiberius::time::DateTime::new(0, fragments)));
            assert_eq!(
                column_data_to_sql_value("d", &data).unwrap(),
                SqlValue::DateTime(midnight + chrono::TimeDelta::milliseconds(millis)),
                "{} fragments",
                fragments
            );
        }
    }

    #[test]
    fn test_decode_binary_unsupported() {
        let err = column_data_to_sql_value("blob", &ColumnData::Binary(Some(vec![1u8].into())))
            .unwrap_err();
        assert!(matches!(err, FrameError::InvalidColumnValue { .. }));
    }
}
