//! # phinx-rs-migrations
//!
//! Runs versioned migrations through any phinx-rs adapter.
//!
//! - [`plan`]: computing which migrations to apply or revert
//! - [`executor`]: running a plan step by step, each inside a transaction
//!   when the adapter supports one, and keeping the version log in sync

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod executor;
pub mod plan;

pub use executor::MigrationExecutor;
pub use plan::{MigrationPlan, MigrationStep};
