//! # phinx-rs-db-adapters
//!
//! Database dialect adapters for phinx-rs. Every adapter implements the
//! [`Adapter`] contract: lazy connection management, raw SQL execution,
//! transaction control driven by an autocommit flag, schema introspection,
//! DDL synthesis, and bookkeeping of applied migrations in the version log.
//!
//! Supported dialects (each behind a Cargo feature):
//! - `SQLite` (`sqlite`): the complete reference dialect
//! - `PostgreSQL` (`postgres`): raw SQL migrations only
//!
//! Adapters are usually obtained by engine name through the
//! [`AdapterFactory`].

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod base;
pub mod factory;
pub mod migration;
pub mod sql;
pub mod version_log;

#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{Adapter, AutocommitFlag, Capabilities};
pub use factory::AdapterFactory;
pub use migration::{Direction, Migration, SqlMigration};
pub use version_log::VersionLogEntry;

#[cfg(feature = "postgres")]
pub use postgresql::PostgresAdapter;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;
