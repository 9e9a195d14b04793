//! Integration tests for the migration runner.
//!
//! These tests run migrations against in-memory SQLite databases and verify
//! that:
//! - Pending migrations are applied in version order and logged
//! - Targets limit how far migrate and rollback go
//! - A failing migration is rolled back and leaves no log entry
//! - Schema-object migrations and raw SQL migrations mix freely

use phinx_rs_core::{Options, PhinxError, PhinxResult};
use phinx_rs_db::{Column, ColumnType, Index, Table};
use phinx_rs_db_adapters::{Adapter, Migration, SqlMigration, SqliteAdapter};
use phinx_rs_migrations::{MigrationExecutor, MigrationStep};

/// Creates the `users` table through schema objects.
struct CreateUsers;

#[async_trait::async_trait]
impl Migration for CreateUsers {
    fn version(&self) -> i64 {
        20_240_101_000_000
    }

    fn name(&self) -> &str {
        "CreateUsers"
    }

    async fn up(&self, adapter: &mut dyn Adapter) -> PhinxResult<()> {
        let users = Table::new("users")
            .column(Column::new("email", ColumnType::String).limit(120))
            .index(Index::new(["email"]).unique());
        adapter.create_table(&users).await
    }

    async fn down(&self, adapter: &mut dyn Adapter) -> PhinxResult<()> {
        adapter.drop_table("users").await
    }
}

fn add_age() -> SqlMigration {
    SqlMigration::new(20_240_102_000_000, "AddAge")
        .up_sql("ALTER TABLE users ADD COLUMN age INTEGER NULL")
        .down_sql("ALTER TABLE users DROP COLUMN age")
}

fn seed() -> SqlMigration {
    SqlMigration::new(20_240_103_000_000, "SeedAdmin")
        .up_sql("INSERT INTO users (email, age) VALUES ('admin@example.com', 40)")
        .down_sql("DELETE FROM users WHERE email = 'admin@example.com'")
}

fn boxed<M: Migration + 'static>(migration: M) -> Box<dyn Migration> {
    Box::new(migration)
}

fn executor() -> MigrationExecutor {
    MigrationExecutor::new(vec![boxed(seed()), boxed(CreateUsers), boxed(add_age())]).unwrap()
}

// ── 1. Migrate ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_migrate_applies_all_in_order() {
    let mut adapter = SqliteAdapter::memory();
    let plan = executor().migrate(&mut adapter, None).await.unwrap();

    assert_eq!(
        plan.versions(),
        vec![20_240_101_000_000, 20_240_102_000_000, 20_240_103_000_000]
    );
    assert!(adapter.has_column("users", "age").await.unwrap());
    assert_eq!(
        adapter.get_versions().await.unwrap(),
        plan.versions()
    );
    let log = adapter.get_version_log().await.unwrap();
    assert_eq!(
        log[&20_240_101_000_000].migration_name.as_deref(),
        Some("CreateUsers")
    );
    assert!(log[&20_240_101_000_000].start_time.is_some());
    assert!(adapter.autocommit());
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let mut adapter = SqliteAdapter::memory();
    let executor = executor();
    executor.migrate(&mut adapter, None).await.unwrap();
    let again = executor.migrate(&mut adapter, None).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_migrate_to_target() {
    let mut adapter = SqliteAdapter::memory();
    let plan = executor()
        .migrate(&mut adapter, Some(20_240_102_000_000))
        .await
        .unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(
        adapter.get_versions().await.unwrap(),
        vec![20_240_101_000_000, 20_240_102_000_000]
    );
}

#[tokio::test]
async fn test_plan_does_not_execute() {
    let mut adapter = SqliteAdapter::memory();
    let plan = executor().plan_migrate(&mut adapter, None).await.unwrap();
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.steps[0], MigrationStep::up(20_240_101_000_000, "CreateUsers"));
    assert!(!adapter.has_table("users").await.unwrap());
    assert!(adapter.get_versions().await.unwrap().is_empty());
}

// ── 2. Rollback ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rollback_latest() {
    let mut adapter = SqliteAdapter::memory();
    let executor = executor();
    executor.migrate(&mut adapter, None).await.unwrap();

    let plan = executor.rollback(&mut adapter, None).await.unwrap();
    assert_eq!(plan.versions(), vec![20_240_103_000_000]);
    assert!(adapter
        .fetch_all("SELECT * FROM users")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(adapter.get_versions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_rollback_to_target() {
    let mut adapter = SqliteAdapter::memory();
    let executor = executor();
    executor.migrate(&mut adapter, None).await.unwrap();

    let plan = executor.rollback(&mut adapter, Some(0)).await.unwrap();
    assert_eq!(
        plan.versions(),
        vec![20_240_103_000_000, 20_240_102_000_000, 20_240_101_000_000]
    );
    assert!(!adapter.has_table("users").await.unwrap());
    assert!(adapter.get_versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_irreversible() {
    let mut adapter = SqliteAdapter::memory();
    let executor = MigrationExecutor::new(vec![boxed(
        SqlMigration::new(1, "OneWay").up_sql("CREATE TABLE one_way (id INTEGER)"),
    )])
    .unwrap();
    executor.migrate(&mut adapter, None).await.unwrap();

    let err = executor.rollback(&mut adapter, None).await.unwrap_err();
    assert!(matches!(err, PhinxError::MigrationError(_)));
    assert_eq!(adapter.get_versions().await.unwrap(), vec![1]);
    assert!(adapter.has_table("one_way").await.unwrap());
}

#[tokio::test]
async fn test_rollback_unknown_applied_version() {
    let mut adapter = SqliteAdapter::memory();
    adapter
        .record_migration(
            &SqlMigration::new(99, "Stranger"),
            phinx_rs_db_adapters::Direction::Up,
            chrono::Utc::now(),
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    let err = executor().rollback(&mut adapter, None).await.unwrap_err();
    assert!(matches!(err, PhinxError::MigrationError(_)));
}

// ── 3. Failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_migration_rolls_back() {
    let mut adapter = SqliteAdapter::memory();
    let broken = SqlMigration::new(20_240_104_000_000, "Broken")
        .up_sql("CREATE TABLE partial (id INTEGER)")
        .up_sql("INSERT INTO missing_table VALUES (1)");
    let executor = MigrationExecutor::new(vec![boxed(CreateUsers), boxed(broken)]).unwrap();

    let err = executor.migrate(&mut adapter, None).await.unwrap_err();
    assert!(matches!(err, PhinxError::QueryError { .. }));

    assert_eq!(adapter.get_versions().await.unwrap(), vec![20_240_101_000_000]);
    assert!(adapter.has_table("users").await.unwrap());
    assert!(!adapter.has_table("partial").await.unwrap());
    assert!(adapter.autocommit());
}

#[tokio::test]
async fn test_failed_migration_with_autocommit_off() {
    let mut adapter = SqliteAdapter::new(Options::sqlite_memory().autocommit(false));
    let broken = SqlMigration::new(5, "Broken")
        .up_sql("CREATE TABLE partial (id INTEGER)")
        .up_sql("SELEC nonsense");
    let executor = MigrationExecutor::new(vec![boxed(broken)]).unwrap();

    assert!(executor.migrate(&mut adapter, None).await.is_err());
    assert!(!adapter.autocommit());
    assert!(adapter.get_versions().await.unwrap().is_empty());
    assert!(!adapter.has_table("partial").await.unwrap());
}

#[test]
fn test_duplicate_versions_rejected() {
    let result = MigrationExecutor::new(vec![
        boxed(SqlMigration::new(1, "A")),
        boxed(SqlMigration::new(1, "B")),
    ]);
    assert!(matches!(result, Err(PhinxError::MigrationError(_))));
}
