//! PostgreSQL adapter using `tokio-postgres`.
//!
//! This dialect runs raw SQL migrations only: connection management,
//! statement execution, transactions, the version log, and table existence
//! checks. Schema objects, introspection, and type mapping keep the trait's
//! default bodies and fail with [`PhinxError::NotImplemented`] before a
//! connection is opened.
//!
//! A single client is held per adapter; its connection future is driven by
//! a spawned tokio task.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use phinx_rs_core::{Options, PhinxError, PhinxResult};
use phinx_rs_db::{Row, Value};
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::base::{Adapter, AutocommitFlag, Capabilities};
use crate::migration::{Direction, Migration};
use crate::sql::{quote_identifier, quote_string};
use crate::version_log::{entries_from_rows, format_timestamp, truncate_name, VersionLogEntry};

/// Port used when the options do not set one.
pub const DEFAULT_PORT: u16 = 5432;

/// Schema used when the options do not set one.
pub const DEFAULT_SCHEMA: &str = "public";

fn sql_state(e: &tokio_postgres::Error) -> Option<String> {
    e.code().map(|c| c.code().to_string())
}

fn query_error(e: &tokio_postgres::Error, sql: &str) -> PhinxError {
    let message = e
        .as_db_error()
        .map_or_else(|| e.to_string(), |db| db.message().to_string());
    PhinxError::query(message, sql_state(e), sql)
}

/// How a column's values are read into [`Value`]s, chosen from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Bytes,
    Uuid,
    Inet,
    Date,
    Timestamp,
    TimestampTz,
    Time,
    Json,
    Text,
    Unsupported,
}

fn decoder_for(ty: &Type) -> Decoder {
    match *ty {
        Type::BOOL => Decoder::Bool,
        Type::INT2 => Decoder::Int2,
        Type::INT4 => Decoder::Int4,
        Type::INT8 => Decoder::Int8,
        Type::OID => Decoder::Oid,
        Type::FLOAT4 => Decoder::Float4,
        Type::FLOAT8 => Decoder::Float8,
        Type::NUMERIC => Decoder::Numeric,
        Type::BYTEA => Decoder::Bytes,
        Type::UUID => Decoder::Uuid,
        Type::INET => Decoder::Inet,
        Type::DATE => Decoder::Date,
        Type::TIMESTAMP => Decoder::Timestamp,
        Type::TIMESTAMPTZ => Decoder::TimestampTz,
        Type::TIME => Decoder::Time,
        Type::JSON | Type::JSONB => Decoder::Json,
        _ if <Text as FromSql>::accepts(ty) => Decoder::Text,
        _ => Decoder::Unsupported,
    }
}

/// Text-like values, enum labels included, read as UTF-8.
struct Text(String);

impl<'a> FromSql<'a> for Text {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Text(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_)) || <String as FromSql>::accepts(ty)
    }
}

fn get<'a, T: FromSql<'a>>(pg_row: &'a tokio_postgres::Row, i: usize) -> PhinxResult<Option<T>> {
    pg_row.try_get::<_, Option<T>>(i).map_err(|e| {
        PhinxError::DataError(format!(
            "Cannot decode column '{}': {e}",
            pg_row.columns()[i].name()
        ))
    })
}

fn decode(pg_row: &tokio_postgres::Row, i: usize) -> PhinxResult<Value> {
    let column = &pg_row.columns()[i];
    let value = match decoder_for(column.type_()) {
        Decoder::Bool => get(pg_row, i)?.map(Value::Bool),
        Decoder::Int2 => get::<i16>(pg_row, i)?.map(|v| Value::Int(i64::from(v))),
        Decoder::Int4 => get::<i32>(pg_row, i)?.map(|v| Value::Int(i64::from(v))),
        Decoder::Int8 => get(pg_row, i)?.map(Value::Int),
        Decoder::Oid => get::<u32>(pg_row, i)?.map(|v| Value::Int(i64::from(v))),
        Decoder::Float4 => get::<f32>(pg_row, i)?.map(|v| Value::Float(f64::from(v))),
        Decoder::Float8 => get(pg_row, i)?.map(Value::Float),
        // Kept as text so no precision is lost.
        Decoder::Numeric => {
            get::<rust_decimal::Decimal>(pg_row, i)?.map(|d| Value::String(d.to_string()))
        }
        Decoder::Bytes => get(pg_row, i)?.map(Value::Bytes),
        Decoder::Uuid => get::<uuid::Uuid>(pg_row, i)?.map(|u| Value::String(u.to_string())),
        Decoder::Inet => get::<IpAddr>(pg_row, i)?.map(|ip| Value::String(ip.to_string())),
        Decoder::Date => get(pg_row, i)?.map(Value::Date),
        Decoder::Timestamp => get(pg_row, i)?.map(Value::DateTime),
        Decoder::TimestampTz => get::<DateTime<Utc>>(pg_row, i)?.map(Value::DateTimeTz),
        Decoder::Time => get(pg_row, i)?.map(Value::Time),
        Decoder::Json => get(pg_row, i)?.map(Value::Json),
        Decoder::Text => get::<Text>(pg_row, i)?.map(|t| Value::String(t.0)),
        Decoder::Unsupported => {
            return Err(PhinxError::DataError(format!(
                "Column '{}' has unsupported type {}; cast it to text in the query",
                column.name(),
                column.type_()
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Converts a `tokio_postgres::Row` to a [`Row`], failing on values that
/// cannot be decoded.
fn convert_row(pg_row: &tokio_postgres::Row) -> PhinxResult<Row> {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let values = (0..columns.len())
        .map(|i| decode(pg_row, i))
        .collect::<PhinxResult<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

/// The PostgreSQL adapter.
pub struct PostgresAdapter {
    options: Options,
    client: Option<Client>,
    in_transaction: bool,
    autocommit: AutocommitFlag,
}

impl PostgresAdapter {
    /// The engine name this adapter is registered under.
    pub const NAME: &'static str = "pgsql";

    /// Creates a disconnected adapter.
    pub fn new(options: Options) -> Self {
        let autocommit = AutocommitFlag::new(options.autocommit);
        Self {
            options,
            client: None,
            in_transaction: false,
            autocommit,
        }
    }

    /// Returns the schema holding the version log.
    pub fn schema(&self) -> &str {
        self.options.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// Builds the driver configuration from the options.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(self.options.host.as_deref().unwrap_or("localhost"))
            .port(self.options.port_or(DEFAULT_PORT));
        if let Some(user) = &self.options.user {
            config.user(user);
        }
        if let Some(pass) = &self.options.pass {
            config.password(pass);
        }
        if let Some(db) = self.options.database() {
            config.dbname(db);
        }
        if let Some(secs) = self.options.connect_timeout {
            config.connect_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Renders the version log DDL for this adapter's schema.
    pub fn version_log_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\"version\" BIGINT NOT NULL PRIMARY KEY, \
             \"migration_name\" VARCHAR(100) NULL, \
             \"start_time\" TIMESTAMP WITH TIME ZONE NULL, \
             \"end_time\" TIMESTAMP WITH TIME ZONE NULL)",
            self.quote_table_name(&self.options.migration_table)
        )
    }

    /// Renders the statement recording a migration in the version log.
    pub fn record_sql(
        &self,
        migration: &dyn Migration,
        direction: Direction,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> String {
        let table = self.quote_table_name(&self.options.migration_table);
        match direction {
            Direction::Up => format!(
                "INSERT INTO {table} (\"version\", \"migration_name\", \"start_time\", \"end_time\") \
                 VALUES ({}, {}, {}, {})",
                migration.version(),
                quote_string(truncate_name(migration.name())),
                quote_string(&format!("{}+00", format_timestamp(start))),
                quote_string(&format!("{}+00", format_timestamp(end))),
            ),
            Direction::Down => format!(
                "DELETE FROM {table} WHERE \"version\" = {}",
                migration.version()
            ),
        }
    }

    fn session_init_sql(&self) -> String {
        let mut sql = String::from("SET TIME ZONE 'UTC';");
        if let Some(charset) = &self.options.charset {
            sql.push_str(&format!(" SET client_encoding TO {};", quote_string(charset)));
        }
        sql
    }

    async fn client(&mut self) -> PhinxResult<&Client> {
        if self.client.is_none() {
            self.connect().await?;
        }
        self.client
            .as_ref()
            .ok_or_else(|| PhinxError::connection("PostgreSQL session is not open", None))
    }

    /// Opens the deferred transaction when autocommit is off and none is
    /// open yet.
    async fn begin_if_deferred(&mut self) -> PhinxResult<()> {
        if self.autocommit.is_enabled() || self.in_transaction {
            return Ok(());
        }
        self.client()
            .await?
            .batch_execute("BEGIN")
            .await
            .map_err(|e| query_error(&e, "BEGIN"))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn end_transaction(&mut self, statement: &'static str) -> PhinxResult<()> {
        let result = match (&self.client, self.in_transaction) {
            (Some(client), true) => client
                .batch_execute(statement)
                .await
                .map_err(|e| query_error(&e, statement)),
            _ => Ok(()),
        };
        self.in_transaction = false;
        self.autocommit.reset();
        tracing::debug!(adapter = Self::NAME, statement, ok = result.is_ok(), "Transaction ended");
        result
    }
}

#[async_trait::async_trait]
impl Adapter for PostgresAdapter {
    fn adapter_name(&self) -> &str {
        Self::NAME
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::RAW_SQL
    }

    // ── Connection ───────────────────────────────────────────────────

    async fn connect(&mut self) -> PhinxResult<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let config = self.pg_config();
        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            PhinxError::connection(format!("PostgreSQL connect failed: {e}"), sql_state(&e))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        let init = self.session_init_sql();
        client
            .batch_execute(&init)
            .await
            .map_err(|e| query_error(&e, &init))?;
        let ddl = self.version_log_sql();
        client
            .batch_execute(&ddl)
            .await
            .map_err(|e| query_error(&e, &ddl))?;

        self.client = Some(client);
        self.in_transaction = false;
        self.autocommit.reset();
        tracing::info!(
            adapter = Self::NAME,
            host = self.options.host.as_deref().unwrap_or("localhost"),
            port = self.options.port_or(DEFAULT_PORT),
            "Connected"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> PhinxResult<()> {
        if self.client.take().is_some() {
            tracing::info!(adapter = Self::NAME, "Disconnected");
        }
        self.in_transaction = false;
        self.autocommit.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    // ── Transactions ─────────────────────────────────────────────────

    fn autocommit(&self) -> bool {
        self.autocommit.is_enabled()
    }

    async fn begin_transaction(&mut self) -> PhinxResult<()> {
        self.autocommit.begin();
        tracing::debug!(adapter = Self::NAME, "Autocommit suspended");
        Ok(())
    }

    async fn commit_transaction(&mut self) -> PhinxResult<()> {
        self.end_transaction("COMMIT").await
    }

    async fn rollback_transaction(&mut self) -> PhinxResult<()> {
        self.end_transaction("ROLLBACK").await
    }

    // ── Execution ────────────────────────────────────────────────────

    async fn execute(&mut self, sql: &str) -> PhinxResult<u64> {
        tracing::debug!(adapter = Self::NAME, sql, "Executing statement");
        self.begin_if_deferred().await?;
        let messages = self
            .client()
            .await?
            .simple_query(sql)
            .await
            .map_err(|e| query_error(&e, sql))?;
        Ok(messages
            .iter()
            .map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => *n,
                _ => 0,
            })
            .sum())
    }

    async fn query(&mut self, sql: &str) -> PhinxResult<Vec<Row>> {
        tracing::debug!(adapter = Self::NAME, sql, "Executing query");
        self.begin_if_deferred().await?;
        let rows = self
            .client()
            .await?
            .query(sql, &[])
            .await
            .map_err(|e| query_error(&e, sql))?;
        rows.iter().map(convert_row).collect()
    }

    // ── Introspection ────────────────────────────────────────────────

    async fn has_table(&mut self, table: &str) -> PhinxResult<bool> {
        let sql = "SELECT 1 FROM information_schema.tables \
                   WHERE table_schema = $1 AND lower(table_name) = lower($2)";
        let schema = self.schema().to_string();
        let found = self
            .client()
            .await?
            .query_opt(sql, &[&schema, &table])
            .await
            .map_err(|e| query_error(&e, sql))?;
        Ok(found.is_some())
    }

    // ── Quoting ──────────────────────────────────────────────────────

    fn quote_table_name(&self, name: &str) -> String {
        format!("{}.{}", quote_identifier(self.schema()), quote_identifier(name))
    }

    // ── Version log ──────────────────────────────────────────────────

    async fn record_migration(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PhinxResult<()> {
        let sql = self.record_sql(migration, direction, &start, &end);
        self.execute(&sql).await?;
        tracing::info!(
            adapter = Self::NAME,
            version = migration.version(),
            direction = %direction,
            "Version log updated"
        );
        Ok(())
    }

    async fn get_version_log(&mut self) -> PhinxResult<BTreeMap<i64, VersionLogEntry>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY \"version\" ASC",
            self.quote_table_name(&self.options.migration_table)
        );
        let rows = self.query(&sql).await?;
        entries_from_rows(&rows)
    }
}
