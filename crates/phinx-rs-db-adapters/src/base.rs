//! The adapter contract and the state shared by every dialect.
//!
//! This module defines the [`Adapter`] trait that all dialects implement,
//! the [`Capabilities`] an adapter advertises, and the [`AutocommitFlag`]
//! that drives transaction demarcation.
//!
//! Operations a dialect does not support keep the trait's default body,
//! which fails with [`PhinxError::NotImplemented`] before any connection is
//! opened or any SQL is sent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use phinx_rs_core::{Options, PhinxError, PhinxResult};
use phinx_rs_db::{Column, ColumnDefault, ColumnType, ForeignKey, Index, Row, Table, Value};

use crate::migration::{Direction, Migration};
use crate::sql::{quote_identifier, quote_string};
use crate::version_log::VersionLogEntry;

/// What an adapter can do, queryable without connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Explicit transaction demarcation is available.
    pub transactions: bool,
    /// Schema changes can be expressed through schema objects.
    pub ddl: bool,
    /// Tables, columns, indexes, and foreign keys can be introspected.
    pub introspection: bool,
    /// `has_table` works even without full introspection.
    pub table_lookup: bool,
}

impl Capabilities {
    /// Every operation is supported.
    pub const FULL: Self = Self {
        transactions: true,
        ddl: true,
        introspection: true,
        table_lookup: true,
    };

    /// Raw SQL, transactions, and table existence checks.
    pub const RAW_SQL: Self = Self {
        transactions: true,
        ddl: false,
        introspection: false,
        table_lookup: true,
    };
}

/// The per-adapter autocommit flag.
///
/// `current` starts at `default` (taken from the adapter options), is
/// cleared by [`begin`](Self::begin), and must be restored with
/// [`reset`](Self::reset) after every commit or rollback, whether or not
/// the native call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutocommitFlag {
    default: bool,
    current: bool,
}

impl AutocommitFlag {
    /// Creates a flag whose current value equals `default`.
    pub const fn new(default: bool) -> Self {
        Self {
            default,
            current: default,
        }
    }

    /// Returns `true` if statements commit immediately.
    pub const fn is_enabled(&self) -> bool {
        self.current
    }

    /// Returns the configured default.
    pub const fn default_value(&self) -> bool {
        self.default
    }

    /// Defers commits until the next commit or rollback.
    pub fn begin(&mut self) {
        self.current = false;
    }

    /// Restores the configured default.
    pub fn reset(&mut self) {
        self.current = self.default;
    }
}

impl Default for AutocommitFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// The contract every database dialect implements.
///
/// An adapter owns exactly one logical session. Every method that may touch
/// the session takes `&mut self` and connects lazily, so statements are
/// issued strictly in call order.
///
/// All methods are async because database operations are I/O-bound. Dialects
/// built on synchronous drivers run them on `spawn_blocking`.
#[async_trait::async_trait]
pub trait Adapter: Send {
    // ── Identity ─────────────────────────────────────────────────────

    /// Returns the engine name this adapter is registered under.
    fn adapter_name(&self) -> &str;

    /// Returns the options the adapter was built from.
    fn options(&self) -> &Options;

    /// Returns what this adapter supports.
    fn capabilities(&self) -> Capabilities;

    /// Builds the error reported for an unsupported operation.
    fn not_implemented(&self, operation: &str) -> PhinxError {
        PhinxError::not_implemented(self.adapter_name(), operation)
    }

    // ── Connection ───────────────────────────────────────────────────

    /// Opens the session if it is not open yet and ensures the version log
    /// table exists.
    async fn connect(&mut self) -> PhinxResult<()>;

    /// Closes the session. Does nothing when already disconnected.
    async fn disconnect(&mut self) -> PhinxResult<()>;

    /// Returns `true` while a session is open.
    fn is_connected(&self) -> bool;

    // ── Transactions ─────────────────────────────────────────────────

    /// Returns `true` if the engine supports explicit transactions.
    fn has_transactions(&self) -> bool {
        self.capabilities().transactions
    }

    /// Returns the current autocommit flag.
    fn autocommit(&self) -> bool;

    /// Clears the autocommit flag; later statements are deferred until
    /// [`commit_transaction`](Self::commit_transaction) or
    /// [`rollback_transaction`](Self::rollback_transaction).
    async fn begin_transaction(&mut self) -> PhinxResult<()> {
        Err(PhinxError::TransactionError(format!(
            "{} adapter does not support transactions",
            self.adapter_name()
        )))
    }

    /// Commits deferred work and restores the autocommit flag.
    async fn commit_transaction(&mut self) -> PhinxResult<()> {
        Err(PhinxError::TransactionError(format!(
            "{} adapter does not support transactions",
            self.adapter_name()
        )))
    }

    /// Discards deferred work and restores the autocommit flag.
    async fn rollback_transaction(&mut self) -> PhinxResult<()> {
        Err(PhinxError::TransactionError(format!(
            "{} adapter does not support transactions",
            self.adapter_name()
        )))
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Executes a statement (or script) and returns the rows affected.
    async fn execute(&mut self, sql: &str) -> PhinxResult<u64>;

    /// Executes a query and returns every result row.
    async fn query(&mut self, sql: &str) -> PhinxResult<Vec<Row>>;

    /// Returns the first row of the result, if any.
    async fn fetch_row(&mut self, sql: &str) -> PhinxResult<Option<Row>> {
        Ok(self.query(sql).await?.into_iter().next())
    }

    /// Returns every row of the result.
    async fn fetch_all(&mut self, sql: &str) -> PhinxResult<Vec<Row>> {
        self.query(sql).await
    }

    // ── Quoting ──────────────────────────────────────────────────────

    /// Quotes a table name for this dialect.
    fn quote_table_name(&self, name: &str) -> String {
        quote_identifier(name)
    }

    /// Quotes a column name for this dialect.
    fn quote_column_name(&self, name: &str) -> String {
        quote_identifier(name)
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Returns `true` if the table exists.
    async fn has_table(&mut self, _table: &str) -> PhinxResult<bool> {
        Err(self.not_implemented("has_table"))
    }

    /// Returns `true` if the table has the column.
    async fn has_column(&mut self, _table: &str, _column: &str) -> PhinxResult<bool> {
        Err(self.not_implemented("has_column"))
    }

    /// Returns `true` if an index covers exactly `columns`.
    async fn has_index(&mut self, _table: &str, _columns: &[&str]) -> PhinxResult<bool> {
        Err(self.not_implemented("has_index"))
    }

    /// Returns `true` if an index with this name exists on the table.
    async fn has_index_by_name(&mut self, _table: &str, _index: &str) -> PhinxResult<bool> {
        Err(self.not_implemented("has_index_by_name"))
    }

    /// Returns `true` if a foreign key over `columns` exists, optionally
    /// also matching the constraint name.
    async fn has_foreign_key(
        &mut self,
        _table: &str,
        _columns: &[&str],
        _constraint: Option<&str>,
    ) -> PhinxResult<bool> {
        Err(self.not_implemented("has_foreign_key"))
    }

    /// Reads the table's columns back as schema objects.
    async fn get_columns(&mut self, _table: &str) -> PhinxResult<Vec<Column>> {
        Err(self.not_implemented("get_columns"))
    }

    /// Reads the table's indexes back as schema objects.
    async fn get_indexes(&mut self, _table: &str) -> PhinxResult<Vec<Index>> {
        Err(self.not_implemented("get_indexes"))
    }

    /// Reads the table's foreign keys back as schema objects.
    async fn get_foreign_keys(&mut self, _table: &str) -> PhinxResult<Vec<ForeignKey>> {
        Err(self.not_implemented("get_foreign_keys"))
    }

    // ── Tables ───────────────────────────────────────────────────────

    /// Creates a table with its columns, indexes, and foreign keys.
    async fn create_table(&mut self, _table: &Table) -> PhinxResult<()> {
        Err(self.not_implemented("create_table"))
    }

    /// Renames a table.
    async fn rename_table(&mut self, _table: &str, _new_name: &str) -> PhinxResult<()> {
        Err(self.not_implemented("rename_table"))
    }

    /// Drops a table.
    async fn drop_table(&mut self, _table: &str) -> PhinxResult<()> {
        Err(self.not_implemented("drop_table"))
    }

    // ── Columns ──────────────────────────────────────────────────────

    /// Adds a column to an existing table.
    async fn add_column(&mut self, _table: &str, _column: &Column) -> PhinxResult<()> {
        Err(self.not_implemented("add_column"))
    }

    /// Renames a column.
    async fn rename_column(&mut self, _table: &str, _column: &str, _new_name: &str) -> PhinxResult<()> {
        Err(self.not_implemented("rename_column"))
    }

    /// Replaces a column's definition.
    async fn change_column(&mut self, _table: &str, _column: &str, _new_column: &Column) -> PhinxResult<()> {
        Err(self.not_implemented("change_column"))
    }

    /// Drops a column.
    async fn drop_column(&mut self, _table: &str, _column: &str) -> PhinxResult<()> {
        Err(self.not_implemented("drop_column"))
    }

    // ── Indexes ──────────────────────────────────────────────────────

    /// Creates an index.
    async fn add_index(&mut self, _table: &str, _index: &Index) -> PhinxResult<()> {
        Err(self.not_implemented("add_index"))
    }

    /// Drops every index covering exactly `columns`. Fails when none does.
    async fn drop_index(&mut self, _table: &str, _columns: &[&str]) -> PhinxResult<()> {
        Err(self.not_implemented("drop_index"))
    }

    /// Drops an index by name. Fails when no such index exists.
    async fn drop_index_by_name(&mut self, _table: &str, _index: &str) -> PhinxResult<()> {
        Err(self.not_implemented("drop_index_by_name"))
    }

    // ── Foreign keys ─────────────────────────────────────────────────

    /// Adds a foreign key constraint.
    async fn add_foreign_key(&mut self, _table: &str, _fk: &ForeignKey) -> PhinxResult<()> {
        Err(self.not_implemented("add_foreign_key"))
    }

    /// Drops the foreign key over `columns`, optionally matching its name.
    async fn drop_foreign_key(
        &mut self,
        _table: &str,
        _columns: &[&str],
        _constraint: Option<&str>,
    ) -> PhinxResult<()> {
        Err(self.not_implemented("drop_foreign_key"))
    }

    // ── Databases ────────────────────────────────────────────────────

    /// Creates a database.
    async fn create_database(&mut self, _name: &str) -> PhinxResult<()> {
        Err(self.not_implemented("create_database"))
    }

    /// Returns `true` if the database exists.
    async fn has_database(&mut self, _name: &str) -> PhinxResult<bool> {
        Err(self.not_implemented("has_database"))
    }

    /// Drops a database.
    async fn drop_database(&mut self, _name: &str) -> PhinxResult<()> {
        Err(self.not_implemented("drop_database"))
    }

    // ── DDL rendering ────────────────────────────────────────────────

    /// Maps an abstract type and limit to the native type name.
    fn sql_type(&self, _column_type: ColumnType, _limit: Option<u32>) -> PhinxResult<String> {
        Err(self.not_implemented("sql_type"))
    }

    /// Maps a native type name back to the abstract type and limit.
    fn phinx_type(&self, _native: &str) -> PhinxResult<(ColumnType, Option<u32>)> {
        Err(self.not_implemented("phinx_type"))
    }

    /// Lists the abstract type names this dialect supports.
    fn column_types(&self) -> PhinxResult<Vec<&'static str>> {
        Err(self.not_implemented("column_types"))
    }

    /// Returns `true` if the column's type is one this dialect supports.
    fn is_valid_column_type(&self, column: &Column) -> PhinxResult<bool> {
        Ok(self.column_types()?.contains(&column.column_type.name()))
    }

    /// Renders `type [NULL|NOT NULL] [DEFAULT ...]` for a column.
    fn column_sql_definition(&self, _column: &Column, _is_create: bool) -> PhinxResult<String> {
        Err(self.not_implemented("column_sql_definition"))
    }

    /// Renders a `CREATE INDEX` statement.
    fn index_sql_definition(&self, _index: &Index, _table: &str) -> PhinxResult<String> {
        Err(self.not_implemented("index_sql_definition"))
    }

    /// Renders a `FOREIGN KEY` table constraint.
    fn foreign_key_sql_definition(&self, _fk: &ForeignKey, _table: &str) -> PhinxResult<String> {
        Err(self.not_implemented("foreign_key_sql_definition"))
    }

    /// Renders a ` DEFAULT ...` clause (with leading space).
    fn default_value_definition(&self, default: &ColumnDefault) -> PhinxResult<String> {
        Ok(format!(" DEFAULT {}", default_literal(default)?))
    }

    // ── Version log ──────────────────────────────────────────────────

    /// Records (up) or removes (down) a migration in the version log.
    async fn record_migration(
        &mut self,
        migration: &dyn Migration,
        direction: Direction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PhinxResult<()>;

    /// Returns every version log entry, ordered by version.
    async fn get_version_log(&mut self) -> PhinxResult<BTreeMap<i64, VersionLogEntry>>;

    /// Returns the applied versions in ascending order.
    async fn get_versions(&mut self) -> PhinxResult<Vec<i64>> {
        Ok(self.get_version_log().await?.into_keys().collect())
    }
}

/// Renders a column default as SQL: literals quoted or formatted, raw
/// expressions verbatim, booleans as `1`/`0`.
pub fn default_literal(default: &ColumnDefault) -> PhinxResult<String> {
    match default {
        ColumnDefault::Expression(expr) => Ok(expr.clone()),
        ColumnDefault::Value(value) => value_literal(value),
    }
}

/// Renders a value as a SQL literal.
///
/// Fails with [`PhinxError::InvalidDefinition`] for NaN and infinite
/// floats, which have no SQL literal.
pub fn value_literal(value: &Value) -> PhinxResult<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) if !f.is_finite() => {
            return Err(PhinxError::InvalidDefinition(format!(
                "Float {f} has no SQL literal"
            )))
        }
        Value::Float(f) => f.to_string(),
        Value::String(s) => quote_string(s),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Date(d) => quote_string(&d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => quote_string(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::DateTimeTz(dt) => quote_string(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Time(t) => quote_string(&t.format("%H:%M:%S").to_string()),
        Value::Json(j) => quote_string(&j.to_string()),
    })
}
