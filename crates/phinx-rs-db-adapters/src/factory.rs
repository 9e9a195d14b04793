//! Adapter registry keyed by engine name.
//!
//! The factory maps names such as `sqlite` or `pgsql` to constructors. A
//! name whose dialect was not compiled in still resolves, but building it
//! fails with [`PhinxError::DriverUnavailable`].

use std::collections::HashMap;
use std::fmt;

use phinx_rs_core::{EnvironmentConfig, Options, PhinxError, PhinxResult};

use crate::base::{Adapter, Capabilities};

type Constructor = Box<dyn Fn(Options) -> PhinxResult<Box<dyn Adapter>> + Send + Sync>;

struct Registration {
    capabilities: Capabilities,
    constructor: Constructor,
}

/// Builds adapters by engine name.
///
/// # Examples
///
/// ```
/// use phinx_rs_db_adapters::AdapterFactory;
///
/// let factory = AdapterFactory::with_builtin();
/// assert!(factory.is_registered("SQLite"));
/// assert!(factory.create("oracle", Default::default()).is_err());
/// ```
pub struct AdapterFactory {
    adapters: HashMap<String, Registration>,
}

impl AdapterFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Creates a factory with the shipped dialects registered:
    /// `sqlite`, and `pgsql` with its aliases `postgres` and `postgresql`.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register("sqlite", Capabilities::FULL, build_sqlite);
        for name in ["pgsql", "postgres", "postgresql"] {
            factory.register(name, Capabilities::RAW_SQL, build_postgres);
        }
        factory
    }

    /// Registers (or replaces) a constructor under `name`.
    pub fn register<F>(&mut self, name: &str, capabilities: Capabilities, constructor: F)
    where
        F: Fn(Options) -> PhinxResult<Box<dyn Adapter>> + Send + Sync + 'static,
    {
        self.adapters.insert(
            name.to_lowercase(),
            Registration {
                capabilities,
                constructor: Box::new(constructor),
            },
        );
    }

    /// Returns `true` if `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.adapters.contains_key(&name.to_lowercase())
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds a disconnected adapter.
    pub fn create(&self, name: &str, options: Options) -> PhinxResult<Box<dyn Adapter>> {
        let registration = self.lookup(name)?;
        tracing::debug!(adapter = name, "Creating adapter");
        (registration.constructor)(options)
    }

    /// Builds the adapter an environment describes.
    pub fn create_from_config(&self, env: &EnvironmentConfig) -> PhinxResult<Box<dyn Adapter>> {
        self.create(&env.adapter, env.options.clone())
    }

    /// Returns what the named adapter supports without building it.
    pub fn capabilities_for(&self, name: &str) -> PhinxResult<Capabilities> {
        Ok(self.lookup(name)?.capabilities)
    }

    fn lookup(&self, name: &str) -> PhinxResult<&Registration> {
        self.adapters.get(&name.to_lowercase()).ok_or_else(|| {
            PhinxError::ConfigurationError(format!("Unknown adapter '{name}'"))
        })
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(feature = "sqlite")]
#[allow(clippy::unnecessary_wraps)]
fn build_sqlite(options: Options) -> PhinxResult<Box<dyn Adapter>> {
    Ok(Box::new(crate::sqlite::SqliteAdapter::new(options)))
}

#[cfg(not(feature = "sqlite"))]
fn build_sqlite(_options: Options) -> PhinxResult<Box<dyn Adapter>> {
    Err(PhinxError::DriverUnavailable(
        "sqlite (enable the `sqlite` feature)".to_string(),
    ))
}

#[cfg(feature = "postgres")]
#[allow(clippy::unnecessary_wraps)]
fn build_postgres(options: Options) -> PhinxResult<Box<dyn Adapter>> {
    Ok(Box::new(crate::postgresql::PostgresAdapter::new(options)))
}

#[cfg(not(feature = "postgres"))]
fn build_postgres(_options: Options) -> PhinxResult<Box<dyn Adapter>> {
    Err(PhinxError::DriverUnavailable(
        "pgsql (enable the `postgres` feature)".to_string(),
    ))
}
