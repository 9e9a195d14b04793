//! Table rebuilds for changes `ALTER TABLE` cannot express in SQLite.
//!
//! The table is copied into `phinx_tmp_<table>` with the new shape, the
//! original is dropped, and the copy is renamed into place. `UNIQUE`
//! constraints and comments are carried in the new DDL; other indexes are
//! recreated afterwards. When no transaction is open the whole rebuild runs
//! inside its own `BEGIN`/`COMMIT`.

use phinx_rs_core::{PhinxError, PhinxResult};
use phinx_rs_db::{Column, ForeignKey, IdColumn, Table, TableOptions};
use rusqlite::Connection;

use super::ddl::{index_sql, table_statement};
use super::introspect::{table_exists, table_shape, IndexOrigin, TableShape};
use super::query_error;
use crate::sql::{quote_identifier, quote_identifier_list};

const TMP_PREFIX: &str = "phinx_tmp_";

/// A column of the rebuilt table and the column it is copied from.
struct CopiedColumn {
    target: String,
    source: Option<String>,
}

/// Replaces a column's definition, renaming it if `new_column` has a new name.
pub fn change_column(
    conn: &Connection,
    table: &str,
    column: &str,
    new_column: &Column,
) -> PhinxResult<()> {
    let mut shape = load(conn, table)?;
    let pos = position(&shape, table, column)?;
    let old_name = shape.columns[pos].name.clone();

    let mut copies = identity_copies(&shape);
    copies[pos] = CopiedColumn {
        target: new_column.name.clone(),
        source: Some(old_name.clone()),
    };
    shape.columns[pos] = new_column.clone();

    if !old_name.eq_ignore_ascii_case(&new_column.name) {
        rename_references(&mut shape, &old_name, &new_column.name);
    }
    if new_column.identity {
        shape
            .primary_key
            .retain(|c| !c.eq_ignore_ascii_case(&new_column.name));
    }

    tracing::debug!(table, column, "Rebuilding table to change column");
    rebuild(conn, table, &shape, &copies)
}

/// Drops a column along with every index and foreign key that uses it.
pub fn drop_column(conn: &Connection, table: &str, column: &str) -> PhinxResult<()> {
    let mut shape = load(conn, table)?;
    let pos = position(&shape, table, column)?;
    let name = shape.columns.remove(pos).name;

    let mut copies = identity_copies(&shape);
    copies.retain(|c| !c.target.eq_ignore_ascii_case(&name));

    shape.primary_key.retain(|c| !c.eq_ignore_ascii_case(&name));
    shape
        .indexes
        .retain(|i| !i.index.columns.iter().any(|c| c.eq_ignore_ascii_case(&name)));
    shape
        .foreign_keys
        .retain(|fk| !fk.columns.iter().any(|c| c.eq_ignore_ascii_case(&name)));

    tracing::debug!(table, column, "Rebuilding table to drop column");
    rebuild(conn, table, &shape, &copies)
}

/// Adds a foreign key constraint.
pub fn add_foreign_key(conn: &Connection, table: &str, fk: &ForeignKey) -> PhinxResult<()> {
    let mut shape = load(conn, table)?;
    for column in &fk.columns {
        position(&shape, table, column)?;
    }
    let copies = identity_copies(&shape);
    shape.foreign_keys.push(fk.clone());

    tracing::debug!(table, referenced = %fk.referenced_table, "Rebuilding table to add foreign key");
    rebuild(conn, table, &shape, &copies)
}

/// Drops the foreign keys over `columns`, optionally matching the
/// constraint name as well. With no columns, only the name is matched.
pub fn drop_foreign_key(
    conn: &Connection,
    table: &str,
    columns: &[String],
    constraint: Option<&str>,
) -> PhinxResult<()> {
    let mut shape = load(conn, table)?;
    let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
    let before = shape.foreign_keys.len();
    shape
        .foreign_keys
        .retain(|fk| !foreign_key_matches(fk, &refs, constraint));
    if shape.foreign_keys.len() == before {
        return Err(PhinxError::InvalidDefinition(format!(
            "No foreign key on '{table}' matches columns {columns:?}{}",
            constraint.map(|c| format!(" and constraint '{c}'")).unwrap_or_default()
        )));
    }
    let copies = identity_copies(&shape);

    tracing::debug!(table, "Rebuilding table to drop foreign key");
    rebuild(conn, table, &shape, &copies)
}

/// Returns `true` if the foreign key matches the column list and name.
pub fn foreign_key_matches(fk: &ForeignKey, columns: &[&str], constraint: Option<&str>) -> bool {
    let name_matches = |name: &str| {
        fk.constraint
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(name))
    };
    match (columns.is_empty(), constraint) {
        (true, Some(name)) => name_matches(name),
        (true, None) => false,
        (false, Some(name)) => fk.covers(columns) && name_matches(name),
        (false, None) => fk.covers(columns),
    }
}

fn load(conn: &Connection, table: &str) -> PhinxResult<TableShape> {
    if !table_exists(conn, table)? {
        return Err(PhinxError::InvalidDefinition(format!(
            "Table '{table}' does not exist"
        )));
    }
    table_shape(conn, table)
}

fn position(shape: &TableShape, table: &str, column: &str) -> PhinxResult<usize> {
    shape
        .columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            PhinxError::InvalidDefinition(format!(
                "Column '{column}' does not exist on table '{table}'"
            ))
        })
}

fn identity_copies(shape: &TableShape) -> Vec<CopiedColumn> {
    shape
        .columns
        .iter()
        .map(|c| CopiedColumn {
            target: c.name.clone(),
            source: Some(c.name.clone()),
        })
        .collect()
}

fn rename_references(shape: &mut TableShape, old: &str, new: &str) {
    let rename = |name: &mut String| {
        if name.eq_ignore_ascii_case(old) {
            *name = new.to_string();
        }
    };
    shape.primary_key.iter_mut().for_each(rename);
    for info in &mut shape.indexes {
        info.index.columns.iter_mut().for_each(rename);
    }
    for fk in &mut shape.foreign_keys {
        fk.columns.iter_mut().for_each(rename);
    }
}

fn rebuild(
    conn: &Connection,
    table: &str,
    shape: &TableShape,
    copies: &[CopiedColumn],
) -> PhinxResult<()> {
    if conn.is_autocommit() {
        run(conn, "BEGIN")?;
        if let Err(e) = rebuild_steps(conn, table, shape, copies) {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::error!(table, error = %rollback, "Rollback after failed rebuild failed");
            }
            return Err(e);
        }
        run(conn, "COMMIT")
    } else {
        rebuild_steps(conn, table, shape, copies)
    }
}

fn rebuild_steps(
    conn: &Connection,
    table: &str,
    shape: &TableShape,
    copies: &[CopiedColumn],
) -> PhinxResult<()> {
    let tmp = format!("{TMP_PREFIX}{table}");
    let definition = Table {
        name: tmp.clone(),
        options: TableOptions {
            id: IdColumn::Disabled,
            primary_key: shape.primary_key.clone(),
            comment: shape.comment.clone(),
        },
        columns: shape.columns.clone(),
        indexes: Vec::new(),
        foreign_keys: shape.foreign_keys.clone(),
    };
    let unique: Vec<Vec<String>> = shape
        .indexes
        .iter()
        .filter(|i| i.origin == IndexOrigin::Unique)
        .map(|i| i.index.columns.clone())
        .collect();
    run(conn, &table_statement(&definition, &unique)?)?;

    let (targets, sources): (Vec<&str>, Vec<&str>) = copies
        .iter()
        .filter_map(|c| c.source.as_deref().map(|s| (c.target.as_str(), s)))
        .unzip();
    if !targets.is_empty() {
        run(
            conn,
            &format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                quote_identifier(&tmp),
                quote_identifier_list(&targets),
                quote_identifier_list(&sources),
                quote_identifier(table)
            ),
        )?;
    }

    run(conn, &format!("DROP TABLE {}", quote_identifier(table)))?;
    run(
        conn,
        &format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(&tmp),
            quote_identifier(table)
        ),
    )?;

    for info in shape
        .indexes
        .iter()
        .filter(|i| i.origin == IndexOrigin::Created)
    {
        run(conn, &index_sql(&info.index, table)?)?;
    }
    Ok(())
}

fn run(conn: &Connection, sql: &str) -> PhinxResult<()> {
    tracing::trace!(sql, "Rebuild step");
    conn.execute_batch(sql).map_err(|e| query_error(&e, sql))
}

#[cfg(test)]
mod tests {
    use phinx_rs_db::{ColumnType, ForeignKeyAction, Index};

    use super::super::ddl::create_table_sql;
    use super::super::introspect::{columns, foreign_keys, indexes, table_sql};
    use super::*;

    fn posts(conn: &Connection) {
        let users = Table::new("users").column(Column::new("email", ColumnType::String));
        let posts = Table::new("posts")
            .column(Column::new("title", ColumnType::String).limit(80))
            .column(Column::new("body", ColumnType::Text).nullable())
            .column(Column::new("user_id", ColumnType::Integer))
            .index(Index::new(["title"]))
            .index(Index::new(["user_id", "title"]).name("idx_owner_title"))
            .foreign_key(
                ForeignKey::new(["user_id"], "users", ["id"])
                    .constraint("fk_posts_user")
                    .on_delete(ForeignKeyAction::Cascade),
            );
        for sql in create_table_sql(&users)
            .unwrap()
            .into_iter()
            .chain(create_table_sql(&posts).unwrap())
        {
            conn.execute_batch(&sql).unwrap();
        }
        conn.execute_batch(
            "INSERT INTO users (email) VALUES ('a@example.com');
             INSERT INTO posts (title, body, user_id) VALUES ('hello', 'world', 1);",
        )
        .unwrap();
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        columns(conn, table)
            .unwrap()
            .0
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    #[test]
    fn test_change_column_keeps_data_and_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        posts(&conn);

        let new = Column::new("headline", ColumnType::String).limit(200);
        change_column(&conn, "posts", "TITLE", &new).unwrap();

        assert_eq!(column_names(&conn, "posts"), ["id", "headline", "body", "user_id"]);
        let (cols, _) = columns(&conn, "posts").unwrap();
        assert_eq!(cols[1].limit, Some(200));
        assert!(cols[0].identity);

        let headline: String = conn
            .query_row("SELECT headline FROM posts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(headline, "hello");

        let idx = indexes(&conn, "posts").unwrap();
        assert!(idx.iter().any(|i| i.index.covers(&["user_id", "headline"])
            && i.index.name.as_deref() == Some("idx_owner_title")));
        assert_eq!(
            foreign_keys(&conn, "posts").unwrap()[0].constraint.as_deref(),
            Some("fk_posts_user")
        );
        assert!(!table_exists(&conn, "phinx_tmp_posts").unwrap());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_drop_column_removes_dependents() {
        let conn = Connection::open_in_memory().unwrap();
        posts(&conn);

        drop_column(&conn, "posts", "user_id").unwrap();
        assert_eq!(column_names(&conn, "posts"), ["id", "title", "body"]);
        assert!(foreign_keys(&conn, "posts").unwrap().is_empty());
        let idx = indexes(&conn, "posts").unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx[0].index.covers(&["title"]));
    }

    #[test]
    fn test_missing_column_or_table() {
        let conn = Connection::open_in_memory().unwrap();
        posts(&conn);
        assert!(matches!(
            drop_column(&conn, "posts", "nope"),
            Err(PhinxError::InvalidDefinition(_))
        ));
        assert!(matches!(
            drop_column(&conn, "nope", "title"),
            Err(PhinxError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_foreign_key_add_and_drop() {
        let conn = Connection::open_in_memory().unwrap();
        posts(&conn);

        drop_foreign_key(&conn, "posts", &["user_id".to_string()], None).unwrap();
        assert!(foreign_keys(&conn, "posts").unwrap().is_empty());
        assert!(drop_foreign_key(&conn, "posts", &["user_id".to_string()], None).is_err());

        let fk = ForeignKey::new(["user_id"], "users", ["id"]).constraint("fk_again");
        add_foreign_key(&conn, "posts", &fk).unwrap();
        let fks = foreign_keys(&conn, "posts").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].constraint.as_deref(), Some("fk_again"));

        drop_foreign_key(&conn, "posts", &[], Some("FK_AGAIN")).unwrap();
        assert!(foreign_keys(&conn, "posts").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_inside_open_transaction() {
        let conn = Connection::open_in_memory().unwrap();
        posts(&conn);
        conn.execute_batch("BEGIN").unwrap();
        drop_column(&conn, "posts", "body").unwrap();
        assert!(!conn.is_autocommit());
        conn.execute_batch("ROLLBACK").unwrap();
        assert_eq!(column_names(&conn, "posts"), ["id", "title", "body", "user_id"]);
    }

    #[test]
    fn test_foreign_key_to_parent_table_survives_rebuild() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE p (id INTEGER PRIMARY KEY);
             CREATE TABLE c (id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p, x INTEGER);",
        )
        .unwrap();

        drop_column(&conn, "c", "x").unwrap();
        assert_eq!(column_names(&conn, "c"), ["id", "p_id"]);
        let fks = foreign_keys(&conn, "c").unwrap();
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referenced_columns, ["id"]);
    }

    #[test]
    fn test_unique_constraint_next_to_same_column_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE "u" ("id" INTEGER PRIMARY KEY, "email" VARCHAR(10) UNIQUE, "n" INTEGER);
               CREATE INDEX "idx_u_email" ON "u" ("email");
               INSERT INTO "u" ("email", "n") VALUES ('a@x', 1);"#,
        )
        .unwrap();

        drop_column(&conn, "u", "n").unwrap();

        let idx = indexes(&conn, "u").unwrap();
        assert_eq!(idx.len(), 2);
        assert!(idx
            .iter()
            .any(|i| i.origin == IndexOrigin::Unique && i.index.covers(&["email"])));
        assert!(idx.iter().any(|i| i.origin == IndexOrigin::Created
            && i.index.name.as_deref() == Some("idx_u_email")));
        assert!(conn
            .execute_batch(r#"INSERT INTO "u" ("email") VALUES ('a@x')"#)
            .is_err());
    }

    #[test]
    fn test_comments_survive_rebuild() {
        let conn = Connection::open_in_memory().unwrap();
        let audit = Table::new("audit")
            .column(Column::new("a", ColumnType::Integer))
            .column(Column::new("b", ColumnType::Text).comment("keep me"))
            .comment("append only");
        for sql in create_table_sql(&audit).unwrap() {
            conn.execute_batch(&sql).unwrap();
        }

        change_column(&conn, "audit", "a", &Column::new("a", ColumnType::BigInteger)).unwrap();

        let (cols, _) = columns(&conn, "audit").unwrap();
        assert_eq!(cols[1].column_type, ColumnType::BigInteger);
        assert_eq!(cols[2].comment.as_deref(), Some("keep me"));
        assert_eq!(cols[1].comment, None);
        let sql = table_sql(&conn, "audit").unwrap().unwrap();
        assert!(sql.contains("/* append only */"), "{sql}");
        assert!(sql.contains("/* keep me */"), "{sql}");
    }

    #[test]
    fn test_untyped_columns_survive_rebuild() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE legacy (a, b INTEGER); INSERT INTO legacy VALUES (x'01', 2);")
            .unwrap();
        drop_column(&conn, "legacy", "b").unwrap();
        assert_eq!(column_names(&conn, "legacy"), ["a"]);
        let a: Vec<u8> = conn
            .query_row("SELECT a FROM legacy", [], |r| r.get(0))
            .unwrap();
        assert_eq!(a, [1]);
    }

    #[test]
    fn test_foreign_key_matches() {
        let fk = ForeignKey::new(["a"], "t", ["id"]).constraint("fk_a");
        assert!(foreign_key_matches(&fk, &["A"], None));
        assert!(foreign_key_matches(&fk, &["a"], Some("fk_a")));
        assert!(!foreign_key_matches(&fk, &["a"], Some("other")));
        assert!(foreign_key_matches(&fk, &[], Some("FK_A")));
        assert!(!foreign_key_matches(&fk, &[], None));
    }
}
