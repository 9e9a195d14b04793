//! # phinx-rs
//!
//! Database dialect adapters and a migration runner for versioned schema
//! migrations.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient
//! access. Dialects are selected with the `sqlite` and `postgres` features.
//!
//! ```no_run
//! use phinx_rs::adapters::{Adapter, AdapterFactory, Migration, SqlMigration};
//! use phinx_rs::core::Options;
//! use phinx_rs::migrations::MigrationExecutor;
//!
//! # async fn demo() -> phinx_rs::core::PhinxResult<()> {
//! let mut adapter = AdapterFactory::with_builtin().create("sqlite", Options::sqlite_memory())?;
//! let create_users = SqlMigration::new(20240101000000, "CreateUsers")
//!     .up_sql("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)")
//!     .down_sql("DROP TABLE users");
//! let migrations: Vec<Box<dyn Migration>> = vec![Box::new(create_users)];
//! let executor = MigrationExecutor::new(migrations)?;
//! executor.migrate(adapter.as_mut(), None).await?;
//! assert_eq!(adapter.get_versions().await?, vec![20240101000000]);
//! # Ok(())
//! # }
//! ```

/// Error types, options, configuration loading, and logging.
pub use phinx_rs_core as core;

/// Rows, values, and schema objects.
pub use phinx_rs_db as db;

/// The adapter contract and the SQLite and PostgreSQL dialects.
pub use phinx_rs_db_adapters as adapters;

/// Migration plans and the executor.
pub use phinx_rs_migrations as migrations;

pub use phinx_rs_core::{PhinxError, PhinxResult};
pub use phinx_rs_db_adapters::{Adapter, AdapterFactory, Direction, Migration, SqlMigration};
pub use phinx_rs_migrations::MigrationExecutor;

/// Attribute for implementing [`Migration`] outside this crate.
pub use async_trait::async_trait;

/// Timestamps passed to [`Adapter::record_migration`].
pub use chrono;
