//! # phinx-rs-core
//!
//! Core types shared by every phinx-rs crate: the error taxonomy, adapter
//! connection options, configuration loading, and logging setup.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`options`] - Adapter options and environment configuration
//! - [`config_loader`] - Loading configuration from TOML/JSON files and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod options;

// Re-export the most commonly used types at the crate root.
pub use error::{PhinxError, PhinxResult};
pub use options::{Config, EnvironmentConfig, Options};
