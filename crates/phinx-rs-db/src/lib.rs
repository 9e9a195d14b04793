//! # phinx-rs-db
//!
//! Dialect-neutral data shared between adapters and migrations: cell
//! [`Value`]s, result [`Row`]s, and the schema objects ([`Table`],
//! [`Column`], [`Index`], [`ForeignKey`]) that adapters render into SQL.
//!
//! Schema objects are plain data. They carry no SQL of their own; each
//! adapter decides how to express them for its engine.

#![allow(clippy::module_name_repetitions)]

pub mod row;
pub mod schema;
pub mod value;

pub use row::{FromValue, Row};
pub use schema::{
    Column, ColumnDefault, ColumnType, ForeignKey, ForeignKeyAction, IdColumn, Index, Table,
    TableOptions,
};
pub use value::Value;
