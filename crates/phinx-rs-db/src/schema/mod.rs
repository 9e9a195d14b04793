//! Schema objects.
//!
//! Plain descriptions of tables, columns, indexes, and foreign keys. Adapters
//! consume these to synthesize DDL and produce them again when introspecting
//! an existing database.

pub mod column;
pub mod foreign_key;
pub mod index;
pub mod table;

pub use column::{Column, ColumnDefault, ColumnType};
pub use foreign_key::{ForeignKey, ForeignKeyAction};
pub use index::Index;
pub use table::{IdColumn, Table, TableOptions};
