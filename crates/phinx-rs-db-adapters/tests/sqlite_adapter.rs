//! SQLite adapter integration tests.
//!
//! Every test uses a private in-memory database unless it exercises the
//! database file operations, which run inside a temporary directory.

use chrono::{Duration, TimeZone, Utc};
use phinx_rs_core::{Options, PhinxError};
use phinx_rs_db::{Column, ColumnDefault, ColumnType, ForeignKey, Index, Table, Value};
use phinx_rs_db_adapters::{Adapter, Direction, Migration, SqlMigration, SqliteAdapter};

fn users_table() -> Table {
    Table::new("users")
        .column(Column::new("email", ColumnType::String).limit(120))
        .column(Column::new("age", ColumnType::Integer).nullable())
        .column(Column::new("active", ColumnType::Boolean).default_value(true))
        .index(Index::new(["email"]).unique())
}

async fn adapter_with_users() -> SqliteAdapter {
    let mut adapter = SqliteAdapter::memory();
    adapter.create_table(&users_table()).await.unwrap();
    adapter
}

// ── Execution ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_execute_and_fetch() {
    let mut adapter = adapter_with_users().await;
    let inserted = adapter
        .execute("INSERT INTO users (email, age) VALUES ('a@x.io', 30), ('b@x.io', NULL)")
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let row = adapter
        .fetch_row("SELECT email, age FROM users ORDER BY id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<String>("email").unwrap(), "a@x.io");

    let all = adapter
        .fetch_all("SELECT age FROM users ORDER BY id")
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].get_value("age"), Some(&Value::Null));

    assert!(adapter
        .fetch_row("SELECT * FROM users WHERE id = 99")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_query_error_carries_sql() {
    let mut adapter = SqliteAdapter::memory();
    let err = adapter.execute("INSERT INTO missing VALUES (1)").await.unwrap_err();
    match err {
        PhinxError::QueryError { sql, .. } => assert_eq!(sql, "INSERT INTO missing VALUES (1)"),
        other => panic!("expected QueryError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_has_table_on_fresh_connection() {
    let mut adapter = SqliteAdapter::memory();
    assert!(!adapter.has_table("NOTREAL").await.unwrap());
    assert!(adapter.has_table("PHINXLOG").await.unwrap());
}

// ── Transactions ────────────────────────────────────────────────────

#[tokio::test]
async fn test_rollback_resets_flag_after_failed_statement() {
    let mut adapter = adapter_with_users().await;
    assert!(adapter.autocommit());

    adapter.begin_transaction().await.unwrap();
    assert!(!adapter.autocommit());
    adapter
        .execute("INSERT INTO users (email) VALUES ('kept@x.io')")
        .await
        .unwrap();
    assert!(adapter.execute("INSERT INTO nope VALUES (1)").await.is_err());
    adapter.rollback_transaction().await.unwrap();

    assert!(adapter.autocommit());
    let rows = adapter.fetch_all("SELECT * FROM users").await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_commit_persists_deferred_work() {
    let mut adapter = adapter_with_users().await;
    adapter.begin_transaction().await.unwrap();
    adapter
        .execute("INSERT INTO users (email) VALUES ('c@x.io')")
        .await
        .unwrap();
    adapter.commit_transaction().await.unwrap();
    assert!(adapter.autocommit());
    assert_eq!(adapter.fetch_all("SELECT * FROM users").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_without_statements_is_noop() {
    let mut adapter = SqliteAdapter::memory();
    adapter.begin_transaction().await.unwrap();
    adapter.commit_transaction().await.unwrap();
    assert!(adapter.autocommit());
}

#[tokio::test]
async fn test_autocommit_false_failure_leaves_no_partial_entry() {
    let mut adapter = SqliteAdapter::new(Options::sqlite_memory().autocommit(false));
    adapter.connect().await.unwrap();
    assert!(!adapter.autocommit());

    let migration = SqlMigration::new(1, "Broken")
        .up_sql("CREATE TABLE half (id INTEGER)")
        .up_sql("INSERT INTO nowhere VALUES (1)");
    let result = migration.up(&mut adapter).await;
    assert!(result.is_err());
    adapter.rollback_transaction().await.unwrap();
    assert!(!adapter.autocommit());

    assert!(adapter.get_version_log().await.unwrap().is_empty());
    assert!(!adapter.has_table("half").await.unwrap());
}

// ── Version log ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_record_up_and_down() {
    let mut adapter = SqliteAdapter::memory();
    let long_name = "CreateEverything".repeat(10);
    let migration = SqlMigration::new(20_240_101_120_000, long_name.clone());
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let end = start + Duration::seconds(3);

    adapter
        .record_migration(&migration, Direction::Up, start, end)
        .await
        .unwrap();
    let log = adapter.get_version_log().await.unwrap();
    assert_eq!(log.len(), 1);
    let entry = &log[&20_240_101_120_000];
    assert_eq!(entry.migration_name.as_deref(), Some(&long_name[..100]));
    assert_eq!(entry.start_time, Some(start));
    assert_eq!(entry.end_time, Some(end));

    adapter
        .record_migration(&migration, Direction::Down, start, end)
        .await
        .unwrap();
    assert!(adapter.get_version_log().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_version_log_is_ordered() {
    let mut adapter = SqliteAdapter::memory();
    let now = Utc::now();
    for version in [30, 10, 20] {
        let m = SqlMigration::new(version, format!("M{version}"));
        adapter
            .record_migration(&m, Direction::Up, now, now)
            .await
            .unwrap();
    }
    assert_eq!(adapter.get_versions().await.unwrap(), vec![10, 20, 30]);
}

#[tokio::test]
async fn test_custom_migration_table() {
    let mut adapter = SqliteAdapter::new(Options::sqlite_memory().migration_table("schema_log"));
    adapter.connect().await.unwrap();
    assert!(adapter.has_table("schema_log").await.unwrap());
    assert!(!adapter.has_table("phinxlog").await.unwrap());
}

// ── Introspection and DDL ───────────────────────────────────────────

#[tokio::test]
async fn test_create_table_and_introspect() {
    let mut adapter = adapter_with_users().await;

    assert!(adapter.has_column("users", "EMAIL").await.unwrap());
    assert!(!adapter.has_column("users", "missing").await.unwrap());
    assert!(adapter.has_index("users", &["email"]).await.unwrap());
    assert!(adapter
        .has_index_by_name("users", "idx_users_email")
        .await
        .unwrap());

    let columns = adapter.get_columns("users").await.unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["id", "email", "age", "active"]);
    assert!(columns[0].identity);
    assert_eq!(columns[1].limit, Some(120));
    assert!(columns[2].null);
    assert_eq!(
        columns[3].default,
        Some(ColumnDefault::Value(Value::Bool(true)))
    );
}

#[tokio::test]
async fn test_column_operations() {
    let mut adapter = adapter_with_users().await;
    adapter
        .execute("INSERT INTO users (email, age) VALUES ('a@x.io', 41)")
        .await
        .unwrap();

    adapter
        .add_column("users", &Column::new("nickname", ColumnType::String).nullable())
        .await
        .unwrap();
    assert!(adapter.has_column("users", "nickname").await.unwrap());

    adapter.rename_column("users", "nickname", "alias").await.unwrap();
    assert!(adapter.has_column("users", "alias").await.unwrap());
    assert!(matches!(
        adapter.rename_column("users", "ghost", "x").await,
        Err(PhinxError::InvalidDefinition(_))
    ));

    adapter
        .change_column(
            "users",
            "age",
            &Column::new("age", ColumnType::BigInteger).default_value(0),
        )
        .await
        .unwrap();
    let age = adapter
        .get_columns("users")
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "age")
        .unwrap();
    assert_eq!(age.column_type, ColumnType::BigInteger);
    assert!(!age.null);

    adapter.drop_column("users", "alias").await.unwrap();
    assert!(!adapter.has_column("users", "alias").await.unwrap());
    assert!(adapter.has_index("users", &["email"]).await.unwrap());

    let row = adapter
        .fetch_row("SELECT age FROM users")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get::<i64>("age").unwrap(), 41);
}

#[tokio::test]
async fn test_comments_round_trip() {
    let mut adapter = SqliteAdapter::memory();
    adapter
        .create_table(
            &Table::new("audit")
                .column(Column::new("a", ColumnType::Integer))
                .column(Column::new("b", ColumnType::Text).comment("keep me"))
                .comment("append only"),
        )
        .await
        .unwrap();
    adapter
        .add_column(
            "audit",
            &Column::new("c", ColumnType::String).nullable().comment("added later"),
        )
        .await
        .unwrap();

    adapter
        .change_column("audit", "a", &Column::new("a", ColumnType::BigInteger))
        .await
        .unwrap();

    let comments: Vec<_> = adapter
        .get_columns("audit")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.comment)
        .collect();
    assert_eq!(
        comments,
        [None, None, Some("keep me".to_string()), Some("added later".to_string())]
    );
    let sql = adapter
        .fetch_row("SELECT sql FROM sqlite_master WHERE name = 'audit'")
        .await
        .unwrap()
        .unwrap();
    assert!(sql.get::<String>("sql").unwrap().contains("/* append only */"));
}

#[tokio::test]
async fn test_untyped_legacy_table() {
    let mut adapter = SqliteAdapter::memory();
    adapter
        .execute("CREATE TABLE legacy (a, b INTEGER)")
        .await
        .unwrap();

    let columns = adapter.get_columns("legacy").await.unwrap();
    assert_eq!(columns[0].column_type, ColumnType::Binary);
    assert_eq!(columns[1].column_type, ColumnType::Integer);

    adapter.drop_column("legacy", "b").await.unwrap();
    assert!(!adapter.has_column("legacy", "b").await.unwrap());
}

#[tokio::test]
async fn test_add_column_rejects_identity() {
    let mut adapter = adapter_with_users().await;
    let err = adapter
        .add_column("users", &Column::new("seq", ColumnType::Integer).identity())
        .await
        .unwrap_err();
    assert!(matches!(err, PhinxError::InvalidDefinition(_)));
}

#[tokio::test]
async fn test_index_operations() {
    let mut adapter = adapter_with_users().await;
    adapter
        .add_index("users", &Index::new(["age", "active"]))
        .await
        .unwrap();
    assert!(adapter.has_index("users", &["age", "active"]).await.unwrap());
    assert!(!adapter.has_index("users", &["active", "age"]).await.unwrap());

    adapter.drop_index("users", &["age", "active"]).await.unwrap();
    assert!(!adapter.has_index("users", &["age", "active"]).await.unwrap());
    assert!(matches!(
        adapter.drop_index("users", &["age", "active"]).await,
        Err(PhinxError::InvalidDefinition(_))
    ));

    adapter
        .add_index("users", &Index::new(["age"]).name("by_age"))
        .await
        .unwrap();
    adapter.drop_index_by_name("users", "BY_AGE").await.unwrap();
    assert!(!adapter.has_index_by_name("users", "by_age").await.unwrap());
    assert!(matches!(
        adapter.drop_index_by_name("users", "by_age").await,
        Err(PhinxError::InvalidDefinition(_))
    ));
    assert!(adapter.has_index("users", &["email"]).await.unwrap());
}

#[tokio::test]
async fn test_foreign_key_operations() {
    let mut adapter = adapter_with_users().await;
    adapter
        .create_table(
            &Table::new("posts")
                .column(Column::new("title", ColumnType::String))
                .column(Column::new("user_id", ColumnType::Integer)),
        )
        .await
        .unwrap();

    let fk = ForeignKey::new(["user_id"], "users", ["id"]).constraint("fk_posts_users");
    adapter.add_foreign_key("posts", &fk).await.unwrap();
    assert!(adapter.has_foreign_key("posts", &["user_id"], None).await.unwrap());
    assert!(adapter
        .has_foreign_key("posts", &["user_id"], Some("fk_posts_users"))
        .await
        .unwrap());
    assert!(!adapter
        .has_foreign_key("posts", &["user_id"], Some("other"))
        .await
        .unwrap());
    assert_eq!(adapter.get_foreign_keys("posts").await.unwrap().len(), 1);

    adapter
        .drop_foreign_key("posts", &["user_id"], None)
        .await
        .unwrap();
    assert!(!adapter.has_foreign_key("posts", &["user_id"], None).await.unwrap());
    assert!(matches!(
        adapter.drop_foreign_key("posts", &["user_id"], None).await,
        Err(PhinxError::InvalidDefinition(_))
    ));
}

#[tokio::test]
async fn test_foreign_key_to_parent_primary_key() {
    let mut adapter = SqliteAdapter::memory();
    adapter
        .execute(
            "CREATE TABLE p (id INTEGER PRIMARY KEY); \
             CREATE TABLE c (id INTEGER PRIMARY KEY, p_id INTEGER REFERENCES p, x INTEGER)",
        )
        .await
        .unwrap();

    adapter.drop_column("c", "x").await.unwrap();
    let fks = adapter.get_foreign_keys("c").await.unwrap();
    assert_eq!(fks.len(), 1);
    assert_eq!(fks[0].referenced_columns, ["id"]);
    assert!(adapter.has_foreign_key("c", &["p_id"], None).await.unwrap());
}

#[tokio::test]
async fn test_rename_and_drop_table() {
    let mut adapter = adapter_with_users().await;
    adapter.rename_table("users", "members").await.unwrap();
    assert!(adapter.has_table("members").await.unwrap());
    assert!(!adapter.has_table("users").await.unwrap());
    adapter.drop_table("members").await.unwrap();
    assert!(!adapter.has_table("members").await.unwrap());
}

#[tokio::test]
async fn test_column_types() {
    let adapter = SqliteAdapter::memory();
    let types = adapter.column_types().unwrap();
    assert!(types.contains(&"string"));
    assert!(types.contains(&"json"));
    assert!(adapter
        .is_valid_column_type(&Column::new("x", ColumnType::Uuid))
        .unwrap());
    assert_eq!(
        adapter.default_value_definition(&ColumnDefault::Value(Value::from("a"))).unwrap(),
        " DEFAULT 'a'"
    );
}

// ── Database files ──────────────────────────────────────────────────

#[tokio::test]
async fn test_database_file_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let name = dir.path().join("app").to_string_lossy().to_string();
    let mut adapter = SqliteAdapter::new(Options::new().name(&name));

    assert!(!adapter.has_database(&name).await.unwrap());
    adapter.create_database(&name).await.unwrap();
    assert!(adapter.has_database(&name).await.unwrap());
    assert!(dir.path().join("app.sqlite3").exists());

    adapter.connect().await.unwrap();
    assert!(adapter.has_table("phinxlog").await.unwrap());

    adapter.drop_database(&name).await.unwrap();
    assert!(!adapter.is_connected());
    assert!(!adapter.has_database(&name).await.unwrap());
}

#[tokio::test]
async fn test_connect_failure_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let name = dir
        .path()
        .join("missing")
        .join("nested")
        .join("app")
        .to_string_lossy()
        .to_string();
    let mut adapter = SqliteAdapter::new(Options::new().name(name));
    assert!(matches!(
        adapter.connect().await,
        Err(PhinxError::ConnectionError { .. })
    ));
    assert!(!adapter.is_connected());
}
