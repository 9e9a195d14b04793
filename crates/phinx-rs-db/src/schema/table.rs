//! Table definitions.

use serde::{Deserialize, Serialize};

use super::column::{Column, ColumnType};
use super::foreign_key::ForeignKey;
use super::index::Index;

/// How the implicit primary key column of a new table is handled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdColumn {
    /// Add an auto-incrementing integer column named `id`.
    #[default]
    Default,
    /// Add an auto-incrementing integer column with this name.
    Named(String),
    /// Do not add an implicit primary key.
    Disabled,
}

/// Table-level options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableOptions {
    /// Implicit identity column.
    pub id: IdColumn,
    /// Explicit primary key columns; used when non-empty.
    pub primary_key: Vec<String>,
    /// Table comment.
    pub comment: Option<String>,
}

/// A table definition.
///
/// # Examples
///
/// ```
/// use phinx_rs_db::{Column, ColumnType, Index, Table};
///
/// let users = Table::new("users")
///     .column(Column::new("email", ColumnType::String).limit(120))
///     .index(Index::new(["email"]).unique());
///
/// let names: Vec<_> = users.all_columns().iter().map(|c| c.name.clone()).collect();
/// assert_eq!(names, ["id", "email"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Table options.
    pub options: TableOptions,
    /// Declared columns, excluding the implicit identity column.
    pub columns: Vec<Column>,
    /// Indexes to create with the table.
    pub indexes: Vec<Index>,
    /// Foreign keys to create with the table.
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Creates an empty table with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: TableOptions::default(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Disables the implicit identity column.
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.options.id = IdColumn::Disabled;
        self
    }

    /// Names the implicit identity column.
    #[must_use]
    pub fn id(mut self, name: impl Into<String>) -> Self {
        self.options.id = IdColumn::Named(name.into());
        self
    }

    /// Sets explicit primary key columns.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Returns the implicit identity column, if one will be created.
    ///
    /// No identity is added when explicit primary key columns are set or
    /// when a declared column already has the identity's name.
    pub fn id_column(&self) -> Option<Column> {
        if !self.options.primary_key.is_empty() {
            return None;
        }
        let name = match &self.options.id {
            IdColumn::Default => "id",
            IdColumn::Named(name) => name.as_str(),
            IdColumn::Disabled => return None,
        };
        if self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)) {
            return None;
        }
        Some(Column::new(name, ColumnType::Integer).identity())
    }

    /// Returns the identity column (if any) followed by the declared columns.
    pub fn all_columns(&self) -> Vec<Column> {
        self.id_column()
            .into_iter()
            .chain(self.columns.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_id_column() {
        let table = Table::new("posts").column(Column::new("title", ColumnType::String));
        let id = table.id_column().unwrap();
        assert_eq!(id.name, "id");
        assert!(id.identity);
        assert_eq!(table.all_columns().len(), 2);
    }

    #[test]
    fn test_named_id_column() {
        let table = Table::new("posts").id("post_id");
        assert_eq!(table.id_column().unwrap().name, "post_id");
    }

    #[test]
    fn test_without_id() {
        let table = Table::new("tags").without_id();
        assert!(table.id_column().is_none());
        assert!(table.all_columns().is_empty());
    }

    #[test]
    fn test_explicit_primary_key_suppresses_id() {
        let table = Table::new("memberships")
            .column(Column::new("user_id", ColumnType::Integer))
            .column(Column::new("group_id", ColumnType::Integer))
            .primary_key(["user_id", "group_id"]);
        assert!(table.id_column().is_none());
        assert_eq!(table.options.primary_key.len(), 2);
    }

    #[test]
    fn test_declared_id_wins() {
        let table = Table::new("accounts").column(Column::new("ID", ColumnType::BigInteger).identity());
        assert!(table.id_column().is_none());
        assert_eq!(table.all_columns()[0].column_type, ColumnType::BigInteger);
    }

    #[test]
    fn test_comment() {
        let table = Table::new("audit").comment("append only");
        assert_eq!(table.options.comment.as_deref(), Some("append only"));
    }
}
