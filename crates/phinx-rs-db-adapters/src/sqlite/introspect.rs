//! Catalog reads for SQLite.
//!
//! Table shape comes from `sqlite_master` and the `pragma_*` table-valued
//! functions. Constraint names and comments that the pragmas do not report
//! are recovered from the stored `CREATE TABLE` text.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use phinx_rs_core::PhinxResult;
use phinx_rs_db::{Column, ColumnDefault, ColumnType, ForeignKey, ForeignKeyAction, Index, Value};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};

use super::ddl::{affinity_type, phinx_type};
use super::query_error;

static FK_CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CONSTRAINT\s+("(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|\w+)\s+FOREIGN\s+KEY\s*\(([^)]*)\)"#,
    )
    .expect("foreign key constraint pattern is valid")
});

/// Where an index came from, as reported by `pragma_index_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// `CREATE INDEX`
    Created,
    /// A `UNIQUE` constraint.
    Unique,
    /// A `PRIMARY KEY` constraint.
    PrimaryKey,
}

/// An index plus its origin.
#[derive(Debug, Clone)]
pub struct IndexInfo {
    /// The index as a schema object.
    pub index: Index,
    /// How it was created.
    pub origin: IndexOrigin,
}

/// The complete shape of an existing table.
#[derive(Debug, Clone)]
pub struct TableShape {
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key columns not covered by an identity column.
    pub primary_key: Vec<String>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes created with `CREATE INDEX` or by `UNIQUE` constraints.
    pub indexes: Vec<IndexInfo>,
    /// Table comment.
    pub comment: Option<String>,
}

/// Returns the stored `CREATE TABLE` text, or `None` if the table is absent.
pub fn table_sql(conn: &Connection, table: &str) -> PhinxResult<Option<String>> {
    let sql = "SELECT sql FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)";
    conn.query_row(sql, [table], |row| row.get::<_, Option<String>>(0))
        .optional()
        .map(Option::flatten)
        .map_err(|e| query_error(&e, sql))
}

/// Returns `true` if the table exists.
pub fn table_exists(conn: &Connection, table: &str) -> PhinxResult<bool> {
    let sql = "SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)";
    conn.query_row(sql, [table], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| query_error(&e, sql))
}

/// Returns the table's column names in declaration order.
pub fn column_names(conn: &Connection, table: &str) -> PhinxResult<Vec<String>> {
    let sql = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    let names = stmt
        .query_map([table], |row| row.get(0))
        .and_then(Iterator::collect)
        .map_err(|e| query_error(&e, sql))?;
    Ok(names)
}

/// Reads the table's columns and non-identity primary key columns.
pub fn columns(conn: &Connection, table: &str) -> PhinxResult<(Vec<Column>, Vec<String>)> {
    let create_sql = table_sql(conn, table)?.unwrap_or_default();
    let autoincrement = create_sql.to_uppercase().contains("AUTOINCREMENT");
    let comments = column_comments(&create_sql);

    let sql = r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#;
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    let raw: Vec<(String, String, i64, Option<String>, i64)> = stmt
        .query_map([table], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .and_then(Iterator::collect)
        .map_err(|e| query_error(&e, sql))?;

    let mut columns = Vec::with_capacity(raw.len());
    let mut pk_columns: Vec<(i64, String)> = Vec::new();
    for (name, native, not_null, default, pk) in raw {
        let (column_type, limit) = phinx_type(&native).unwrap_or_else(|_| affinity_type(&native));
        let identity = pk > 0 && autoincrement && native.eq_ignore_ascii_case("INTEGER");
        if pk > 0 && !identity {
            pk_columns.push((pk, name.clone()));
        }
        let mut default = parse_default(default.as_deref());
        if column_type == ColumnType::Boolean {
            if let Some(ColumnDefault::Value(Value::Int(i))) = default {
                default = Some(ColumnDefault::Value(Value::Bool(i != 0)));
            }
        }
        columns.push(Column {
            column_type,
            limit,
            null: not_null == 0 && !identity,
            default: if identity { None } else { default },
            identity,
            comment: comments.get(&name.to_lowercase()).cloned(),
            name,
        });
    }

    pk_columns.sort_by_key(|(seq, _)| *seq);
    Ok((columns, pk_columns.into_iter().map(|(_, n)| n).collect()))
}

/// Reads every index on the table, including constraint-backed ones.
pub fn indexes(conn: &Connection, table: &str) -> PhinxResult<Vec<IndexInfo>> {
    let list_sql = r#"SELECT name, "unique", origin FROM pragma_index_list(?1) ORDER BY seq DESC"#;
    let mut stmt = conn.prepare(list_sql).map_err(|e| query_error(&e, list_sql))?;
    let listed: Vec<(String, bool, String)> = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .and_then(Iterator::collect)
        .map_err(|e| query_error(&e, list_sql))?;

    let info_sql = "SELECT name FROM pragma_index_info(?1) ORDER BY seqno";
    let mut info = conn.prepare(info_sql).map_err(|e| query_error(&e, info_sql))?;

    let mut result = Vec::with_capacity(listed.len());
    for (name, unique, origin) in listed {
        let columns: Vec<String> = info
            .query_map([&name], |row| row.get(0))
            .and_then(Iterator::collect)
            .map_err(|e| query_error(&e, info_sql))?;
        let origin = match origin.as_str() {
            "pk" => IndexOrigin::PrimaryKey,
            "u" => IndexOrigin::Unique,
            _ => IndexOrigin::Created,
        };
        result.push(IndexInfo {
            index: Index {
                columns,
                name: Some(name),
                unique,
            },
            origin,
        });
    }
    Ok(result)
}

/// Reads the table's foreign keys, recovering constraint names from its DDL.
pub fn foreign_keys(conn: &Connection, table: &str) -> PhinxResult<Vec<ForeignKey>> {
    let create_sql = table_sql(conn, table)?.unwrap_or_default();
    let names = constraint_names(&create_sql);

    let sql = r#"SELECT id, "table", "from", "to", on_update, on_delete FROM pragma_foreign_key_list(?1) ORDER BY id DESC, seq"#;
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    type FkRow = (i64, String, String, Option<String>, String, String);
    let rows: Vec<FkRow> = stmt
        .query_map([table], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .and_then(Iterator::collect)
        .map_err(|e| query_error(&e, sql))?;

    let mut order: Vec<i64> = Vec::new();
    let mut grouped: HashMap<i64, ForeignKey> = HashMap::new();
    for (id, referenced, from, to, on_update, on_delete) in rows {
        let fk = grouped.entry(id).or_insert_with(|| {
            order.push(id);
            ForeignKey {
                columns: Vec::new(),
                referenced_table: referenced,
                referenced_columns: Vec::new(),
                constraint: None,
                on_delete: parse_action(&on_delete),
                on_update: parse_action(&on_update),
            }
        });
        fk.columns.push(from);
        if let Some(to) = to {
            fk.referenced_columns.push(to);
        }
    }

    let mut result = Vec::with_capacity(order.len());
    for mut fk in order.into_iter().filter_map(|id| grouped.remove(&id)) {
        if fk.referenced_columns.is_empty() {
            fk.referenced_columns = primary_key_columns(conn, &fk.referenced_table)?;
        }
        fk.constraint = names.get(&column_key(&fk.columns)).cloned();
        result.push(fk);
    }
    Ok(result)
}

/// Returns the table's primary key columns in key order, implicit rowid
/// aliases included. A foreign key that names only its parent table
/// references these.
fn primary_key_columns(conn: &Connection, table: &str) -> PhinxResult<Vec<String>> {
    let sql = "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk";
    let mut stmt = conn.prepare(sql).map_err(|e| query_error(&e, sql))?;
    let names = stmt
        .query_map([table], |row| row.get(0))
        .and_then(Iterator::collect)
        .map_err(|e| query_error(&e, sql))?;
    Ok(names)
}

/// Reads the full shape of an existing table.
pub fn table_shape(conn: &Connection, table: &str) -> PhinxResult<TableShape> {
    let (columns, primary_key) = columns(conn, table)?;
    let create_sql = table_sql(conn, table)?.unwrap_or_default();
    Ok(TableShape {
        columns,
        primary_key,
        foreign_keys: foreign_keys(conn, table)?,
        indexes: indexes(conn, table)?,
        comment: table_comment(&create_sql),
    })
}

/// Returns the comment placed between the table name and its definitions.
pub fn table_comment(create_sql: &str) -> Option<String> {
    let (head, _) = split_create_table(create_sql)?;
    block_comments(head).pop()
}

/// Maps each lowercased column name to the last comment in its definition.
pub fn column_comments(create_sql: &str) -> HashMap<String, String> {
    let Some((_, definitions)) = split_create_table(create_sql) else {
        return HashMap::new();
    };
    definitions
        .into_iter()
        .filter_map(|def| {
            let name = column_name(def)?;
            let comment = block_comments(def).pop()?;
            Some((name.to_lowercase(), comment))
        })
        .collect()
}

/// Splits `CREATE TABLE` text into the text before the definition list and
/// the top-level definitions.
fn split_create_table(sql: &str) -> Option<(&str, Vec<&str>)> {
    let bytes = sql.as_bytes();
    let mut depth = 0usize;
    let mut open = None;
    let mut start = 0;
    let mut definitions = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                i = skip_quoted(bytes, i, q);
                continue;
            }
            b'[' => {
                i = skip_past(sql, i + 1, "]");
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_past(sql, i + 2, "*/");
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_past(sql, i + 2, "\n");
                continue;
            }
            b'(' => {
                depth += 1;
                if open.is_none() {
                    open = Some(i);
                    start = i + 1;
                }
            }
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    definitions.push(&sql[start..i]);
                    return Some((&sql[..open?], definitions));
                }
            }
            b',' if depth == 1 => {
                definitions.push(&sql[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Returns the index just past the quoted run starting at `at`.
fn skip_quoted(bytes: &[u8], at: usize, quote: u8) -> usize {
    let mut i = at + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_past(sql: &str, from: usize, end: &str) -> usize {
    sql.get(from..)
        .and_then(|rest| rest.find(end))
        .map_or(sql.len(), |pos| from + pos + end.len())
}

/// Collects the trimmed bodies of `/* */` comments outside quoted text.
fn block_comments(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut comments = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, q),
            b'[' => i = skip_past(text, i + 1, "]"),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_past(text, i + 2, "\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = skip_past(text, i + 2, "*/");
                let body = text.get(i + 2..end).unwrap_or_default();
                comments.push(body.trim_end_matches("*/").trim().to_string());
                i = end;
            }
            _ => i += 1,
        }
    }
    comments
}

/// Returns the column a definition declares, or `None` for table
/// constraints.
fn column_name(definition: &str) -> Option<String> {
    let trimmed = definition.trim_start();
    let first = trimmed.chars().next()?;
    let token = match first {
        '"' | '`' => {
            let end = skip_quoted(trimmed.as_bytes(), 0, first as u8);
            return Some(unquote(&trimmed[..end]));
        }
        '[' => {
            let end = skip_past(trimmed, 1, "]");
            return Some(unquote(&trimmed[..end]));
        }
        _ => trimmed
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .filter(|t| !t.is_empty())?,
    };
    let keyword = ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]
        .iter()
        .any(|k| token.eq_ignore_ascii_case(k));
    (!keyword).then(|| token.to_string())
}

/// Parses a `dflt_value` as reported by `pragma_table_info`.
///
/// Quoted strings, integers, floats, and `TRUE`/`FALSE` become literal
/// values; `NULL` or no default becomes `None`; anything else is kept as a
/// raw expression.
pub fn parse_default(raw: Option<&str>) -> Option<ColumnDefault> {
    let raw = raw?.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        let inner = &raw[1..raw.len() - 1];
        return Some(ColumnDefault::Value(Value::String(inner.replace("''", "'"))));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Some(ColumnDefault::Value(Value::Int(i)));
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Some(ColumnDefault::Value(Value::Float(f)));
    }
    if raw.eq_ignore_ascii_case("TRUE") {
        return Some(ColumnDefault::Value(Value::Bool(true)));
    }
    if raw.eq_ignore_ascii_case("FALSE") {
        return Some(ColumnDefault::Value(Value::Bool(false)));
    }
    Some(ColumnDefault::Expression(raw.to_string()))
}

fn parse_action(raw: &str) -> Option<ForeignKeyAction> {
    match raw.parse::<ForeignKeyAction>() {
        Ok(ForeignKeyAction::NoAction) | Err(_) => None,
        Ok(action) => Some(action),
    }
}

fn unquote(identifier: &str) -> String {
    let trimmed = identifier.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some('"'), Some('"')) => trimmed[1..trimmed.len() - 1].replace("\"\"", "\""),
        (Some('`'), Some('`')) | (Some('['), Some(']')) => trimmed[1..trimmed.len() - 1].to_string(),
        _ => trimmed.to_string(),
    }
}

fn column_key<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| c.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

/// Maps each named foreign key's column list to its constraint name.
fn constraint_names(create_sql: &str) -> HashMap<String, String> {
    FK_CONSTRAINT_RE
        .captures_iter(create_sql)
        .map(|caps| {
            let columns: Vec<String> = caps[2].split(',').map(unquote).collect();
            (column_key(&columns), unquote(&caps[1]))
        })
        .collect()
}
