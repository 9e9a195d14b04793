//! The migration object seen by adapters.
//!
//! Adapters only need a migration's version and name (for the version log)
//! and the ability to run its `up`/`down` steps against themselves.

use std::fmt;
use std::str::FromStr;

use phinx_rs_core::{PhinxError, PhinxResult};

use crate::base::Adapter;

/// Which way a migration is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply the migration.
    Up,
    /// Revert the migration.
    Down,
}

impl Direction {
    /// Returns `"up"` or `"down"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = PhinxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("up") {
            Ok(Self::Up)
        } else if s.eq_ignore_ascii_case("down") {
            Ok(Self::Down)
        } else {
            Err(PhinxError::MigrationError(format!(
                "Unknown migration direction '{s}'"
            )))
        }
    }
}

/// A versioned migration.
///
/// Versions are conventionally `YYYYMMDDHHMMSS` timestamps and must be
/// unique within a project.
#[async_trait::async_trait]
pub trait Migration: Send + Sync {
    /// Returns the migration version.
    fn version(&self) -> i64;

    /// Returns the human-readable migration name.
    fn name(&self) -> &str;

    /// Applies the migration.
    async fn up(&self, adapter: &mut dyn Adapter) -> PhinxResult<()>;

    /// Reverts the migration. Irreversible unless overridden.
    async fn down(&self, _adapter: &mut dyn Adapter) -> PhinxResult<()> {
        Err(PhinxError::MigrationError(format!(
            "Migration {} ({}) is irreversible",
            self.version(),
            self.name()
        )))
    }
}

/// A migration made of raw SQL statements.
///
/// The form every adapter can run, including those limited to raw SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    version: i64,
    name: String,
    up: Vec<String>,
    down: Option<Vec<String>>,
}

impl SqlMigration {
    /// Creates an irreversible migration with no statements.
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up: Vec::new(),
            down: None,
        }
    }

    /// Appends a statement run on `up`.
    #[must_use]
    pub fn up_sql(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    /// Appends a statement run on `down`, making the migration reversible.
    #[must_use]
    pub fn down_sql(mut self, sql: impl Into<String>) -> Self {
        self.down.get_or_insert_with(Vec::new).push(sql.into());
        self
    }
}

#[async_trait::async_trait]
impl Migration for SqlMigration {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, adapter: &mut dyn Adapter) -> PhinxResult<()> {
        for sql in &self.up {
            adapter.execute(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, adapter: &mut dyn Adapter) -> PhinxResult<()> {
        let Some(statements) = &self.down else {
            return Err(PhinxError::MigrationError(format!(
                "Migration {} ({}) is irreversible",
                self.version, self.name
            )));
        };
        for sql in statements {
            adapter.execute(sql).await?;
        }
        Ok(())
    }
}
