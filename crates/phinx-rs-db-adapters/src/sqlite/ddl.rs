//! SQLite type mapping and DDL rendering.
//!
//! Everything here is pure: schema objects in, SQL text out. The adapter
//! composes these and submits the result through its executor.

use once_cell::sync::Lazy;
use phinx_rs_core::{PhinxError, PhinxResult};
use phinx_rs_db::{Column, ColumnType, ForeignKey, Index, Table};
use regex::Regex;

use crate::base::default_literal;
use crate::sql::{escape_comment, quote_identifier, quote_identifier_list};

/// Length used for `string` and `char` columns without an explicit limit.
pub const DEFAULT_STRING_LIMIT: u32 = 255;

/// Definition of an identity column. SQLite only allows it at table creation.
pub const IDENTITY_DEFINITION: &str = "INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT";

static NATIVE_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9_ ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
        .expect("native type pattern is valid")
});

/// Maps an abstract type to its SQLite type name.
///
/// Only `string` and `char` take a limit; other types ignore it.
pub fn sql_type(column_type: ColumnType, limit: Option<u32>) -> PhinxResult<String> {
    Ok(match column_type {
        ColumnType::String => format!("VARCHAR({})", limit.unwrap_or(DEFAULT_STRING_LIMIT)),
        ColumnType::Char => format!("CHAR({})", limit.unwrap_or(DEFAULT_STRING_LIMIT)),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInteger => "BIGINT".to_string(),
        ColumnType::Float => "FLOAT".to_string(),
        ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
        ColumnType::DateTime => "DATETIME".to_string(),
        ColumnType::Timestamp => "TIMESTAMP".to_string(),
        ColumnType::Time => "TIME".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::Binary => "BLOB".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Uuid => "UUID".to_string(),
        ColumnType::Json => "JSON".to_string(),
    })
}

/// Maps a SQLite type name back to the abstract type and limit.
///
/// Common synonyms (`INT`, `REAL`, `CLOB`, `NUMERIC`, ...) are accepted. A
/// limit equal to [`DEFAULT_STRING_LIMIT`] is reported as `None`.
pub fn phinx_type(native: &str) -> PhinxResult<(ColumnType, Option<u32>)> {
    let unsupported = || PhinxError::UnsupportedType(native.to_string());
    let caps = NATIVE_TYPE_RE.captures(native).ok_or_else(unsupported)?;
    let name = caps[1].to_uppercase();
    let first: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let second: Option<u32> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    let limit = first.filter(|l| *l != DEFAULT_STRING_LIMIT);

    let mapped = match name.as_str() {
        "VARCHAR" | "CHARACTER VARYING" | "VARYING CHARACTER" | "NVARCHAR" => {
            (ColumnType::String, limit)
        }
        "CHAR" | "CHARACTER" | "NCHAR" | "NATIVE CHARACTER" => (ColumnType::Char, limit),
        "TEXT" | "CLOB" => (ColumnType::Text, None),
        "INTEGER" | "INT" | "SMALLINT" | "MEDIUMINT" | "TINYINT" => (ColumnType::Integer, None),
        "BIGINT" | "UNSIGNED BIG INT" | "INT8" => (ColumnType::BigInteger, None),
        "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" => (ColumnType::Float, None),
        "DECIMAL" | "NUMERIC" => (
            ColumnType::Decimal {
                precision: first.unwrap_or(10),
                scale: second.unwrap_or(0),
            },
            None,
        ),
        "DATETIME" => (ColumnType::DateTime, None),
        "TIMESTAMP" => (ColumnType::Timestamp, None),
        "TIME" => (ColumnType::Time, None),
        "DATE" => (ColumnType::Date, None),
        "BLOB" => (ColumnType::Binary, None),
        "BOOLEAN" | "BOOL" => (ColumnType::Boolean, None),
        "UUID" => (ColumnType::Uuid, None),
        "JSON" => (ColumnType::Json, None),
        _ => return Err(unsupported()),
    };
    Ok(mapped)
}

/// Maps a declared type that [`phinx_type`] rejects using SQLite's column
/// affinity rules, so legacy and untyped columns stay readable.
pub fn affinity_type(native: &str) -> (ColumnType, Option<u32>) {
    let upper = native.to_uppercase();
    if upper.trim().is_empty() || upper.contains("BLOB") {
        (ColumnType::Binary, None)
    } else if upper.contains("INT") {
        (ColumnType::Integer, None)
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|k| upper.contains(k)) {
        (ColumnType::Text, None)
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|k| upper.contains(k)) {
        (ColumnType::Float, None)
    } else {
        (
            ColumnType::Decimal {
                precision: 10,
                scale: 0,
            },
            None,
        )
    }
}

/// Renders a column's type, nullability, default, and comment.
///
/// Identity columns render as [`IDENTITY_DEFINITION`] and are rejected when
/// `is_create` is false.
pub fn column_definition(column: &Column, is_create: bool) -> PhinxResult<String> {
    let mut def = if column.identity {
        if !is_create {
            return Err(PhinxError::InvalidDefinition(format!(
                "SQLite cannot add identity column '{}' to an existing table",
                column.name
            )));
        }
        if !column.column_type.is_integer() {
            return Err(PhinxError::InvalidDefinition(format!(
                "Identity column '{}' must be an integer type, got {}",
                column.name, column.column_type
            )));
        }
        IDENTITY_DEFINITION.to_string()
    } else {
        let mut def = sql_type(column.column_type, column.limit)?;
        def.push_str(if column.null { " NULL" } else { " NOT NULL" });
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&default_literal(default)?);
        }
        def
    };

    if let Some(comment) = &column.comment {
        def.push_str(&format!(" /* {} */", escape_comment(comment)));
    }
    Ok(def)
}

/// Renders `"name" <definition>`.
pub fn column_sql(column: &Column, is_create: bool) -> PhinxResult<String> {
    Ok(format!(
        "{} {}",
        quote_identifier(&column.name),
        column_definition(column, is_create)?
    ))
}

/// Derives an index name from the table and columns.
pub fn default_index_name<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let cols: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    format!("idx_{}_{}", table, cols.join("_")).to_lowercase()
}

/// Renders a `CREATE [UNIQUE] INDEX` statement.
pub fn index_sql(index: &Index, table: &str) -> PhinxResult<String> {
    if index.columns.is_empty() {
        return Err(PhinxError::InvalidDefinition(format!(
            "Index on '{table}' has no columns"
        )));
    }
    let name = index
        .name
        .clone()
        .unwrap_or_else(|| default_index_name(table, &index.columns));
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_identifier(&name),
        quote_identifier(table),
        quote_identifier_list(&index.columns)
    ))
}

/// Renders a `FOREIGN KEY` table constraint.
pub fn foreign_key_sql(fk: &ForeignKey) -> PhinxResult<String> {
    if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
        return Err(PhinxError::InvalidDefinition(format!(
            "Foreign key to '{}' needs matching column lists, got {:?} and {:?}",
            fk.referenced_table, fk.columns, fk.referenced_columns
        )));
    }

    let mut def = String::new();
    if let Some(name) = &fk.constraint {
        def.push_str(&format!("CONSTRAINT {} ", quote_identifier(name)));
    }
    def.push_str(&format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_identifier_list(&fk.columns),
        quote_identifier(&fk.referenced_table),
        quote_identifier_list(&fk.referenced_columns)
    ));
    if let Some(action) = fk.on_delete {
        def.push_str(&format!(" ON DELETE {}", action.as_sql()));
    }
    if let Some(action) = fk.on_update {
        def.push_str(&format!(" ON UPDATE {}", action.as_sql()));
    }
    Ok(def)
}

/// Renders the `CREATE TABLE` statement alone, without indexes.
pub fn create_table_statement(table: &Table) -> PhinxResult<String> {
    table_statement(table, &[])
}

/// Renders `CREATE TABLE` with extra `UNIQUE` table constraints.
///
/// Table rebuilds use this to carry inline `UNIQUE` constraints, whose
/// autoindexes cannot be recreated with `CREATE INDEX`.
pub fn table_statement(table: &Table, unique: &[Vec<String>]) -> PhinxResult<String> {
    let columns = table.all_columns();
    let identities = columns.iter().filter(|c| c.identity).count();
    if identities > 1 {
        return Err(PhinxError::InvalidDefinition(format!(
            "Table '{}' declares {identities} identity columns",
            table.name
        )));
    }
    if identities == 1 && !table.options.primary_key.is_empty() {
        return Err(PhinxError::InvalidDefinition(format!(
            "Table '{}' combines an identity column with an explicit primary key",
            table.name
        )));
    }

    let mut defs = columns
        .iter()
        .map(|c| column_sql(c, true))
        .collect::<PhinxResult<Vec<_>>>()?;
    if defs.is_empty() {
        return Err(PhinxError::InvalidDefinition(format!(
            "Table '{}' has no columns",
            table.name
        )));
    }
    if !table.options.primary_key.is_empty() {
        defs.push(format!(
            "PRIMARY KEY ({})",
            quote_identifier_list(&table.options.primary_key)
        ));
    }
    for columns in unique {
        defs.push(format!("UNIQUE ({})", quote_identifier_list(columns)));
    }
    for fk in &table.foreign_keys {
        defs.push(foreign_key_sql(fk)?);
    }

    let comment = match &table.options.comment {
        Some(comment) => format!(" /* {} */", escape_comment(comment)),
        None => String::new(),
    };
    Ok(format!(
        "CREATE TABLE {}{comment} ({})",
        quote_identifier(&table.name),
        defs.join(", ")
    ))
}

/// Renders every statement needed to create the table and its indexes.
pub fn create_table_sql(table: &Table) -> PhinxResult<Vec<String>> {
    let mut statements = vec![create_table_statement(table)?];
    for index in &table.indexes {
        statements.push(index_sql(index, &table.name)?);
    }
    Ok(statements)
}

/// Renders the version log DDL.
pub fn create_version_log_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\"version\" BIGINT NOT NULL PRIMARY KEY, \
         \"migration_name\" VARCHAR(100) NULL, \"start_time\" TIMESTAMP NULL, \
         \"end_time\" TIMESTAMP NULL)",
        quote_identifier(table)
    )
}
