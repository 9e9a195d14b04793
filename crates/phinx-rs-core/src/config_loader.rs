//! Configuration loading from files and the environment.
//!
//! ## Loading Order
//!
//! 1. Start with the default [`Config`].
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `PHINX_ENVIRONMENT` | `default_environment` |
//! | `PHINX_LOG_LEVEL` | `log_level` |
//! | `PHINX_DEBUG` | `debug` |
//! | `PHINX_MIGRATION_TABLE` | `default_migration_table` |
//! | `PHINX_DB_HOST` | `host` of the default environment |
//! | `PHINX_DB_PORT` | `port` of the default environment |
//! | `PHINX_DB_USER` | `user` of the default environment |
//! | `PHINX_DB_PASS` | `pass` of the default environment |
//! | `PHINX_DB_NAME` | `name` of the default environment |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use phinx_rs_core::config_loader;
//!
//! let config = config_loader::from_toml_file_with_env("phinx.toml").unwrap();
//! let env = config.default_env().unwrap();
//! ```

use std::path::Path;

use crate::error::PhinxError;
use crate::options::Config;

/// Loads configuration from a TOML string, keeping defaults for absent keys.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Config, PhinxError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| PhinxError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_with_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Config, PhinxError> {
    from_toml_str(&read_file(path.as_ref(), "TOML")?)
}

/// Loads configuration from a TOML file and then applies environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Config, PhinxError> {
    let mut config = from_toml_file(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Loads configuration from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Config, PhinxError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| PhinxError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_with_defaults(json_value, "JSON")
}

/// Loads configuration from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Config, PhinxError> {
    from_json_str(&read_file(path.as_ref(), "JSON")?)
}

/// Loads configuration from a JSON file and then applies environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Config, PhinxError> {
    let mut config = from_json_file(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Applies `PHINX_*` environment variable overrides.
///
/// Connection overrides target the default environment (after
/// `PHINX_ENVIRONMENT` has been applied) and are ignored when that
/// environment is not configured. An unparsable `PHINX_DB_PORT` is ignored.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("PHINX_ENVIRONMENT") {
        config.default_environment = val;
    }

    if let Ok(val) = std::env::var("PHINX_LOG_LEVEL") {
        config.log_level = val;
    }

    if let Ok(val) = std::env::var("PHINX_DEBUG") {
        config.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("PHINX_MIGRATION_TABLE") {
        config.default_migration_table = val;
    }

    let Some(env) = config.environments.get_mut(&config.default_environment) else {
        return;
    };
    let options = &mut env.options;

    if let Ok(val) = std::env::var("PHINX_DB_HOST") {
        options.host = Some(val);
    }

    if let Ok(val) = std::env::var("PHINX_DB_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            options.port = Some(port);
        }
    }

    if let Ok(val) = std::env::var("PHINX_DB_USER") {
        options.user = Some(val);
    }

    if let Ok(val) = std::env::var("PHINX_DB_PASS") {
        options.pass = Some(val);
    }

    if let Ok(val) = std::env::var("PHINX_DB_NAME") {
        options.name = Some(val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_file(path: &Path, format: &str) -> Result<String, PhinxError> {
    std::fs::read_to_string(path).map_err(|e| {
        PhinxError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_with_defaults(value: serde_json::Value, format: &str) -> Result<Config, PhinxError> {
    let default_json = serde_json::to_value(Config::default()).map_err(|e| {
        PhinxError::ConfigurationError(format!("Failed to serialize default config: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        PhinxError::ConfigurationError(format!("Failed to deserialize config from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
