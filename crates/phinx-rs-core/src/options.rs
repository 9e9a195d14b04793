//! Adapter options and environment configuration.
//!
//! [`Options`] holds the immutable connection parameters an adapter is built
//! from. [`Config`] groups named environments (development, testing,
//! production, ...) each pairing an adapter name with its options.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PhinxError, PhinxResult};

/// The default name of the version log table.
pub const DEFAULT_MIGRATION_TABLE: &str = "phinxlog";

/// The default file suffix for SQLite databases.
pub const DEFAULT_SQLITE_SUFFIX: &str = ".sqlite3";

/// Connection options for a single adapter.
///
/// Missing fields fall back to their defaults when deserialized, so a
/// configuration file only needs to name the values it cares about.
///
/// # Examples
///
/// ```
/// use phinx_rs_core::Options;
///
/// let opts = Options::new().name("app").host("db.internal").port(6432);
/// assert_eq!(opts.database(), Some("app"));
/// assert!(opts.autocommit);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Server host name. Ignored by SQLite.
    pub host: Option<String>,
    /// Server port; the dialect default is used when absent.
    pub port: Option<u16>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub pass: Option<String>,
    /// Database name (for SQLite, the file path without suffix).
    pub name: Option<String>,
    /// Alternative database/service identifier, used when `name` is absent.
    pub sid: Option<String>,
    /// Schema to operate in (PostgreSQL).
    pub schema: Option<String>,
    /// Client character set.
    pub charset: Option<String>,
    /// Whether statements commit immediately outside explicit transactions.
    pub autocommit: bool,
    /// Name of the version log table.
    pub migration_table: String,
    /// SQLite database file suffix.
    pub suffix: String,
    /// Open an in-memory SQLite database instead of a file.
    pub memory: bool,
    /// Connection timeout in seconds.
    pub connect_timeout: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            pass: None,
            name: None,
            sid: None,
            schema: None,
            charset: None,
            autocommit: true,
            migration_table: DEFAULT_MIGRATION_TABLE.to_string(),
            suffix: DEFAULT_SQLITE_SUFFIX.to_string(),
            memory: false,
            connect_timeout: None,
        }
    }
}

impl Options {
    /// Creates options with every field at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self {
            memory: true,
            ..Self::default()
        }
    }

    /// Sets the database name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the user and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }

    /// Sets the schema.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the client character set.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the default autocommit mode.
    #[must_use]
    pub const fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Sets the version log table name.
    #[must_use]
    pub fn migration_table(mut self, table: impl Into<String>) -> Self {
        self.migration_table = table.into();
        self
    }

    /// Sets the connection timeout in seconds.
    #[must_use]
    pub const fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = Some(seconds);
        self
    }

    /// Returns the database identifier: `name`, or `sid` when no name is set.
    pub fn database(&self) -> Option<&str> {
        self.name.as_deref().or(self.sid.as_deref())
    }

    /// Returns the port, or `default` when none is configured.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

/// One named environment: which adapter to use and how to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// The adapter name, e.g. "sqlite" or "pgsql".
    pub adapter: String,
    /// Connection options, flattened into the environment table.
    #[serde(flatten)]
    pub options: Options,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter directive, e.g. "info" or "`phinx_rs=debug`".
    pub log_level: String,
    /// Human-readable log output instead of JSON.
    pub debug: bool,
    /// Version log table used by environments that do not name their own.
    pub default_migration_table: String,
    /// Environment selected when none is requested explicitly.
    pub default_environment: String,
    /// Named environments.
    pub environments: HashMap<String, EnvironmentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug: false,
            default_migration_table: DEFAULT_MIGRATION_TABLE.to_string(),
            default_environment: "development".to_string(),
            environments: HashMap::new(),
        }
    }
}

impl Config {
    /// Returns the named environment with the default migration table applied.
    pub fn environment(&self, name: &str) -> PhinxResult<EnvironmentConfig> {
        let env = self.environments.get(name).ok_or_else(|| {
            PhinxError::ConfigurationError(format!("Environment '{name}' is not configured"))
        })?;
        let mut env = env.clone();
        if env.options.migration_table == DEFAULT_MIGRATION_TABLE {
            env.options
                .migration_table
                .clone_from(&self.default_migration_table);
        }
        Ok(env)
    }

    /// Returns the default environment.
    pub fn default_env(&self) -> PhinxResult<EnvironmentConfig> {
        self.environment(&self.default_environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts = Options::default();
        assert!(opts.autocommit);
        assert_eq!(opts.migration_table, "phinxlog");
        assert_eq!(opts.suffix, ".sqlite3");
        assert!(!opts.memory);
        assert!(opts.database().is_none());
    }

    #[test]
    fn test_database_prefers_name_over_sid() {
        let mut opts = Options::new();
        opts.sid = Some("ORCL".into());
        assert_eq!(opts.database(), Some("ORCL"));
        let opts = opts.name("app");
        assert_eq!(opts.database(), Some("app"));
    }

    #[test]
    fn test_port_or() {
        assert_eq!(Options::new().port_or(5432), 5432);
        assert_eq!(Options::new().port(6543).port_or(5432), 6543);
    }

    #[test]
    fn test_builder_chain() {
        let opts = Options::new()
            .host("localhost")
            .credentials("root", "secret")
            .schema("audit")
            .charset("utf8")
            .autocommit(false)
            .migration_table("versions")
            .connect_timeout(5);
        assert_eq!(opts.user.as_deref(), Some("root"));
        assert_eq!(opts.pass.as_deref(), Some("secret"));
        assert_eq!(opts.schema.as_deref(), Some("audit"));
        assert!(!opts.autocommit);
        assert_eq!(opts.migration_table, "versions");
        assert_eq!(opts.connect_timeout, Some(5));
    }

    #[test]
    fn test_environment_lookup() {
        let mut config = Config {
            default_migration_table: "schema_log".into(),
            ..Config::default()
        };
        config.environments.insert(
            "development".into(),
            EnvironmentConfig {
                adapter: "sqlite".into(),
                options: Options::sqlite_memory(),
            },
        );

        let env = config.default_env().unwrap();
        assert_eq!(env.adapter, "sqlite");
        assert_eq!(env.options.migration_table, "schema_log");
        assert!(config.environment("production").is_err());
    }

    #[test]
    fn test_environment_keeps_explicit_table() {
        let mut config = Config {
            default_migration_table: "schema_log".into(),
            ..Config::default()
        };
        config.environments.insert(
            "testing".into(),
            EnvironmentConfig {
                adapter: "pgsql".into(),
                options: Options::new().migration_table("custom_log"),
            },
        );
        let env = config.environment("testing").unwrap();
        assert_eq!(env.options.migration_table, "custom_log");
    }
}
