//! SQLite adapter using `rusqlite`.
//!
//! This is the complete dialect: raw SQL, transactions, introspection, DDL
//! synthesis, and table rebuilds for the schema changes SQLite's
//! `ALTER TABLE` cannot express.
//!
//! `rusqlite` is synchronous, so every call runs on
//! `tokio::task::spawn_blocking` against a connection guarded by an async
//! mutex. File databases use WAL journaling; `:memory:` databases are
//! supported for tests.

pub mod ddl;
pub mod introspect;
mod rebuild;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use phinx_rs_core::{Options, PhinxError, PhinxResult};
use phinx_rs_db::{Column, ColumnType, ForeignKey, Index, Row, Table, Value};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::base::{Adapter, AutocommitFlag, Capabilities};
use crate::migration::{Direction, Migration};
use crate::sql::{has_multiple_statements, quote_identifier, quote_string};
use crate::version_log::{entries_from_rows, format_timestamp, truncate_name, VersionLogEntry};

use self::introspect::IndexOrigin;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

type Shared = Arc<Mutex<Connection>>;

/// Maps a driver error to a [`PhinxError::QueryError`] carrying `sql`.
pub(crate) fn query_error(e: &rusqlite::Error, sql: &str) -> PhinxError {
    PhinxError::query(e.to_string(), native_code(e), sql)
}

fn native_code(e: &rusqlite::Error) -> Option<String> {
    match e {
        rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code.to_string()),
        _ => None,
    }
}

fn join_error(e: tokio::task::JoinError) -> PhinxError {
    PhinxError::connection(format!("SQLite task failed: {e}"), None)
}

/// Runs `f` against the connection on the blocking pool.
async fn blocking<T, F>(conn: Shared, f: F) -> PhinxResult<T>
where
    F: FnOnce(&Connection) -> PhinxResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = conn.blocking_lock();
        f(&conn)
    })
    .await
    .map_err(join_error)?
}

/// Executes one statement or a script.
///
/// Scripts run through `execute_batch` and report zero rows affected.
fn execute_sql(conn: &Connection, sql: &str) -> PhinxResult<u64> {
    if has_multiple_statements(sql) {
        conn.execute_batch(sql).map_err(|e| query_error(&e, sql))?;
        return Ok(0);
    }
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    match stmt.raw_execute() {
        Ok(count) => Ok(count as u64),
        Err(rusqlite::Error::ExecuteReturnedResults) => Ok(0),
        Err(e) => Err(query_error(&e, sql)),
    }
}

fn query_sql(conn: &Connection, sql: &str) -> PhinxResult<Vec<Row>> {
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut raw_rows = stmt.query([]).map_err(|e| query_error(&e, sql))?;
    let mut rows = Vec::new();
    while let Some(row) = raw_rows.next().map_err(|e| query_error(&e, sql))? {
        rows.push(convert_row(row, &column_names));
    }
    Ok(rows)
}

/// Converts a `rusqlite::Row` to a [`Row`].
fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
    let values: Vec<Value> = (0..column_names.len())
        .map(|i| match sqlite_row.get_ref(i).unwrap_or(ValueRef::Null) {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Int(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).to_string()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        })
        .collect();
    Row::new(column_names.to_vec(), values)
}

/// Ends the open transaction, if any, with `COMMIT` or `ROLLBACK`.
///
/// A failed `COMMIT` is followed by a `ROLLBACK` so the session is never
/// left inside a transaction.
fn finish_transaction(conn: &Connection, statement: &str) -> PhinxResult<()> {
    if conn.is_autocommit() {
        return Ok(());
    }
    if let Err(e) = conn.execute_batch(statement) {
        if !conn.is_autocommit() {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %rollback, "ROLLBACK after failed {statement} failed");
            }
        }
        return Err(query_error(&e, statement));
    }
    Ok(())
}

/// The SQLite adapter.
///
/// # Examples
///
/// ```no_run
/// use phinx_rs_core::Options;
/// use phinx_rs_db_adapters::{Adapter, SqliteAdapter};
///
/// # async fn demo() -> phinx_rs_core::PhinxResult<()> {
/// let mut adapter = SqliteAdapter::new(Options::sqlite_memory());
/// adapter.execute("CREATE TABLE t (id INTEGER)").await?;
/// assert!(adapter.has_table("t").await?);
/// # Ok(())
/// # }
/// ```
pub struct SqliteAdapter {
    options: Options,
    conn: Option<Shared>,
    autocommit: AutocommitFlag,
}

impl SqliteAdapter {
    /// The engine name this adapter is registered under.
    pub const NAME: &'static str = "sqlite";

    /// Creates a disconnected adapter.
    pub fn new(options: Options) -> Self {
        let autocommit = AutocommitFlag::new(options.autocommit);
        Self {
            options,
            conn: None,
            autocommit,
        }
    }

    /// Creates a disconnected adapter for a private in-memory database.
    pub fn memory() -> Self {
        Self::new(Options::sqlite_memory())
    }

    /// Returns the path the adapter opens: [`MEMORY_PATH`] for in-memory
    /// databases, otherwise the database name followed by the suffix.
    pub fn database_path(&self) -> PhinxResult<String> {
        if self.options.memory {
            return Ok(MEMORY_PATH.to_string());
        }
        let name = self.options.database().ok_or_else(|| {
            PhinxError::ConfigurationError(
                "SQLite adapter needs a database name or the memory option".to_string(),
            )
        })?;
        Ok(self.path_for(name))
    }

    fn path_for(&self, name: &str) -> String {
        if name == MEMORY_PATH {
            MEMORY_PATH.to_string()
        } else {
            format!("{name}{}", self.options.suffix)
        }
    }

    async fn session(&mut self) -> PhinxResult<Shared> {
        if self.conn.is_none() {
            self.connect().await?;
        }
        self.conn
            .clone()
            .ok_or_else(|| PhinxError::connection("SQLite session is not open", None))
    }

    /// Runs a read against the session as is.
    async fn with_conn<T, F>(&mut self, f: F) -> PhinxResult<T>
    where
        F: FnOnce(&Connection) -> PhinxResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.session().await?;
        blocking(conn, f).await
    }

    /// Runs a statement, first opening the deferred transaction when
    /// autocommit is off and none is open yet.
    async fn with_statement<T, F>(&mut self, f: F) -> PhinxResult<T>
    where
        F: FnOnce(&Connection) -> PhinxResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let deferred = !self.autocommit.is_enabled();
        let conn = self.session().await?;
        blocking(conn, move |conn| {
            if deferred && conn.is_autocommit() {
                conn.execute_batch("BEGIN")
                    .map_err(|e| query_error(&e, "BEGIN"))?;
            }
            f(conn)
        })
        .await
    }

    async fn end_transaction(&mut self, statement: &'static str) -> PhinxResult<()> {
        let result = match self.conn.clone() {
            Some(conn) => blocking(conn, move |c| finish_transaction(c, statement)).await,
            None => Ok(()),
        };
        self.autocommit.reset();
        tracing::debug!(adapter = Self::NAME, statement, ok = result.is_ok(), "Transaction ended");
        result
    }
}

#[async_trait::async_trait]
impl Adapter for SqliteAdapter {
    fn adapter_name(&self) -> &str {
        Self::NAME
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    // ── Connection ───────────────────────────────────────────────────

    async fn connect(&mut self) -> PhinxResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let path = self.database_path()?;
        let table = self.options.migration_table.clone();
        let open_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || -> PhinxResult<Connection> {
            let memory = open_path == MEMORY_PATH;
            let conn = if memory {
                Connection::open_in_memory()
            } else {
                Connection::open(&open_path)
            }
            .map_err(|e| {
                PhinxError::connection(
                    format!("SQLite open failed for '{open_path}': {e}"),
                    native_code(&e),
                )
            })?;

            if !memory {
                conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(|e| {
                    PhinxError::connection(
                        format!("Failed to set pragmas: {e}"),
                        native_code(&e),
                    )
                })?;
            }

            let ddl = ddl::create_version_log_sql(&table);
            conn.execute_batch(&ddl).map_err(|e| query_error(&e, &ddl))?;
            Ok(conn)
        })
        .await
        .map_err(join_error)??;

        self.conn = Some(Arc::new(Mutex::new(conn)));
        self.autocommit.reset();
        tracing::info!(adapter = Self::NAME, path = %path, "Connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> PhinxResult<()> {
        if self.conn.take().is_some() {
            tracing::info!(adapter = Self::NAME, "Disconnected");
        }
        self.autocommit.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
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
        let sql = sql.to_string();
        self.with_statement(move |conn| execute_sql(conn, &sql)).await
    }

    async fn query(&mut self, sql: &str) -> PhinxResult<Vec<Row>> {
        tracing::debug!(adapter = Self::NAME, sql, "Executing query");
        let sql = sql.to_string();
        self.with_statement(move |conn| query_sql(conn, &sql)).await
    }

    // ── Introspection ────────────────────────────────────────────────

    async fn has_table(&mut self, table: &str) -> PhinxResult<bool> {
        let table = table.to_string();
        self.with_conn(move |conn| introspect::table_exists(conn, &table))
            .await
    }

    async fn has_column(&mut self, table: &str, column: &str) -> PhinxResult<bool> {
        let table = table.to_string();
        let names = self
            .with_conn(move |conn| introspect::column_names(conn, &table))
            .await?;
        Ok(names.iter().any(|n| n.eq_ignore_ascii_case(column)))
    }

    async fn has_index(&mut self, table: &str, columns: &[&str]) -> PhinxResult<bool> {
        Ok(self
            .get_indexes(table)
            .await?
            .iter()
            .any(|i| i.covers(columns)))
    }

    async fn has_index_by_name(&mut self, table: &str, index: &str) -> PhinxResult<bool> {
        Ok(self.get_indexes(table).await?.iter().any(|i| {
            i.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(index))
        }))
    }

    async fn has_foreign_key(
        &mut self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> PhinxResult<bool> {
        Ok(self
            .get_foreign_keys(table)
            .await?
            .iter()
            .any(|fk| rebuild::foreign_key_matches(fk, columns, constraint)))
    }

    async fn get_columns(&mut self, table: &str) -> PhinxResult<Vec<Column>> {
        let table = table.to_string();
        self.with_conn(move |conn| Ok(introspect::columns(conn, &table)?.0))
            .await
    }

    async fn get_indexes(&mut self, table: &str) -> PhinxResult<Vec<Index>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            Ok(introspect::indexes(conn, &table)?
                .into_iter()
                .filter(|i| i.origin != IndexOrigin::PrimaryKey)
                .map(|i| i.index)
                .collect())
        })
        .await
    }

    async fn get_foreign_keys(&mut self, table: &str) -> PhinxResult<Vec<ForeignKey>> {
        let table = table.to_string();
        self.with_conn(move |conn| introspect::foreign_keys(conn, &table))
            .await
    }

    // ── Tables ───────────────────────────────────────────────────────

    async fn create_table(&mut self, table: &Table) -> PhinxResult<()> {
        let statements = ddl::create_table_sql(table)?;
        tracing::debug!(adapter = Self::NAME, table = %table.name, "Creating table");
        self.with_statement(move |conn| {
            for sql in &statements {
                conn.execute_batch(sql).map_err(|e| query_error(&e, sql))?;
            }
            Ok(())
        })
        .await
    }

    async fn rename_table(&mut self, table: &str, new_name: &str) -> PhinxResult<()> {
        let sql = format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(table),
            quote_identifier(new_name)
        );
        self.execute(&sql).await.map(|_| ())
    }

    async fn drop_table(&mut self, table: &str) -> PhinxResult<()> {
        let sql = format!("DROP TABLE {}", quote_identifier(table));
        self.execute(&sql).await.map(|_| ())
    }

    // ── Columns ──────────────────────────────────────────────────────

    async fn add_column(&mut self, table: &str, column: &Column) -> PhinxResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_identifier(table),
            ddl::column_sql(column, false)?
        );
        self.execute(&sql).await.map(|_| ())
    }

    async fn rename_column(&mut self, table: &str, column: &str, new_name: &str) -> PhinxResult<()> {
        if !self.has_column(table, column).await? {
            return Err(PhinxError::InvalidDefinition(format!(
                "Column '{column}' does not exist on table '{table}'"
            )));
        }
        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_identifier(table),
            quote_identifier(column),
            quote_identifier(new_name)
        );
        self.execute(&sql).await.map(|_| ())
    }

    async fn change_column(&mut self, table: &str, column: &str, new_column: &Column) -> PhinxResult<()> {
        let (table, column, new_column) = (table.to_string(), column.to_string(), new_column.clone());
        self.with_statement(move |conn| rebuild::change_column(conn, &table, &column, &new_column))
            .await
    }

    async fn drop_column(&mut self, table: &str, column: &str) -> PhinxResult<()> {
        let (table, column) = (table.to_string(), column.to_string());
        self.with_statement(move |conn| rebuild::drop_column(conn, &table, &column))
            .await
    }

    // ── Indexes ──────────────────────────────────────────────────────

    async fn add_index(&mut self, table: &str, index: &Index) -> PhinxResult<()> {
        let sql = ddl::index_sql(index, table)?;
        self.execute(&sql).await.map(|_| ())
    }

    async fn drop_index(&mut self, table: &str, columns: &[&str]) -> PhinxResult<()> {
        let table = table.to_string();
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        self.with_statement(move |conn| {
            let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
            let names: Vec<String> = introspect::indexes(conn, &table)?
                .into_iter()
                .filter(|i| i.origin == IndexOrigin::Created && i.index.covers(&refs))
                .filter_map(|i| i.index.name)
                .collect();
            if names.is_empty() {
                return Err(PhinxError::InvalidDefinition(format!(
                    "No index on '{table}' matches columns {columns:?}"
                )));
            }
            for name in names {
                let sql = format!("DROP INDEX {}", quote_identifier(&name));
                conn.execute_batch(&sql).map_err(|e| query_error(&e, &sql))?;
            }
            Ok(())
        })
        .await
    }

    async fn drop_index_by_name(&mut self, table: &str, index: &str) -> PhinxResult<()> {
        let (table, index) = (table.to_string(), index.to_string());
        self.with_statement(move |conn| {
            let exists = introspect::indexes(conn, &table)?.into_iter().any(|i| {
                i.origin == IndexOrigin::Created
                    && i.index
                        .name
                        .as_deref()
                        .is_some_and(|n| n.eq_ignore_ascii_case(&index))
            });
            if !exists {
                return Err(PhinxError::InvalidDefinition(format!(
                    "No index named '{index}' on '{table}'"
                )));
            }
            let sql = format!("DROP INDEX {}", quote_identifier(&index));
            conn.execute_batch(&sql).map_err(|e| query_error(&e, &sql))
        })
        .await
    }

    // ── Foreign keys ─────────────────────────────────────────────────

    async fn add_foreign_key(&mut self, table: &str, fk: &ForeignKey) -> PhinxResult<()> {
        ddl::foreign_key_sql(fk)?;
        let (table, fk) = (table.to_string(), fk.clone());
        self.with_statement(move |conn| rebuild::add_foreign_key(conn, &table, &fk))
            .await
    }

    async fn drop_foreign_key(
        &mut self,
        table: &str,
        columns: &[&str],
        constraint: Option<&str>,
    ) -> PhinxResult<()> {
        let table = table.to_string();
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        let constraint = constraint.map(str::to_string);
        self.with_statement(move |conn| {
            rebuild::drop_foreign_key(conn, &table, &columns, constraint.as_deref())
        })
        .await
    }

    // ── Databases ────────────────────────────────────────────────────

    async fn create_database(&mut self, name: &str) -> PhinxResult<()> {
        let path = self.path_for(name);
        if path == MEMORY_PATH {
            return Ok(());
        }
        tokio::task::spawn_blocking(move || {
            Connection::open(&path).map(drop).map_err(|e| {
                PhinxError::connection(
                    format!("SQLite create failed for '{path}': {e}"),
                    native_code(&e),
                )
            })
        })
        .await
        .map_err(join_error)?
    }

    async fn has_database(&mut self, name: &str) -> PhinxResult<bool> {
        let path = self.path_for(name);
        if path == MEMORY_PATH {
            return Ok(true);
        }
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn drop_database(&mut self, name: &str) -> PhinxResult<()> {
        let path = self.path_for(name);
        if path == MEMORY_PATH {
            return Ok(());
        }
        if self.database_path().ok().as_deref() == Some(path.as_str()) {
            self.disconnect().await?;
        }
        for file in [path.clone(), format!("{path}-wal"), format!("{path}-shm")] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(adapter = Self::NAME, path = %path, "Database dropped");
        Ok(())
    }

    // ── DDL rendering ────────────────────────────────────────────────

    fn sql_type(&self, column_type: ColumnType, limit: Option<u32>) -> PhinxResult<String> {
        ddl::sql_type(column_type, limit)
    }

    fn phinx_type(&self, native: &str) -> PhinxResult<(ColumnType, Option<u32>)> {
        ddl::phinx_type(native)
    }

    fn column_types(&self) -> PhinxResult<Vec<&'static str>> {
        Ok(ColumnType::ALL_NAMES.to_vec())
    }

    fn column_sql_definition(&self, column: &Column, is_create: bool) -> PhinxResult<String> {
        ddl::column_definition(column, is_create)
    }

    fn index_sql_definition(&self, index: &Index, table: &str) -> PhinxResult<String> {
        ddl::index_sql(index, table)
    }

    fn foreign_key_sql_definition(&self, fk: &ForeignKey, _table: &str) -> PhinxResult<String> {
        ddl::foreign_key_sql(fk)
    }

    // ── Version log ──────────────────────────────────────────────────

    async fn record_migration(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PhinxResult<()> {
        let table = quote_identifier(&self.options.migration_table);
        let sql = match direction {
            Direction::Up => format!(
                "INSERT INTO {table} (\"version\", \"migration_name\", \"start_time\", \"end_time\") \
                 VALUES ({}, {}, {}, {})",
                migration.version(),
                quote_string(truncate_name(migration.name())),
                quote_string(&format_timestamp(&start)),
                quote_string(&format_timestamp(&end)),
            ),
            Direction::Down => format!(
                "DELETE FROM {table} WHERE \"version\" = {}",
                migration.version()
            ),
        };
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
            quote_identifier(&self.options.migration_table)
        );
        let rows = self.query(&sql).await?;
        entries_from_rows(&rows)
    }
}
