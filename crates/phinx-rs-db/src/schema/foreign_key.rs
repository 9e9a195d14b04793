//! Foreign key definitions.

use std::fmt;
use std::str::FromStr;

use phinx_rs_core::PhinxError;
use serde::{Deserialize, Serialize};

/// Referential action for `ON DELETE` / `ON UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// `CASCADE`
    Cascade,
    /// `RESTRICT`
    Restrict,
    /// `SET NULL`
    SetNull,
    /// `SET DEFAULT`
    SetDefault,
    /// `NO ACTION`
    NoAction,
}

impl ForeignKeyAction {
    /// Returns the SQL keyword(s) for this action.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ForeignKeyAction {
    type Err = PhinxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('_', " ");
        match normalized.as_str() {
            "CASCADE" => Ok(Self::Cascade),
            "RESTRICT" => Ok(Self::Restrict),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            "NO ACTION" => Ok(Self::NoAction),
            _ => Err(PhinxError::InvalidDefinition(format!(
                "Unknown foreign key action '{s}'"
            ))),
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns in the owning table.
    pub columns: Vec<String>,
    /// The referenced table.
    pub referenced_table: String,
    /// Referenced columns, pairwise with `columns`.
    pub referenced_columns: Vec<String>,
    /// Constraint name.
    pub constraint: Option<String>,
    /// `ON DELETE` action.
    pub on_delete: Option<ForeignKeyAction>,
    /// `ON UPDATE` action.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKey {
    /// Creates a foreign key from `columns` to `referenced_columns` of `referenced_table`.
    pub fn new<I, S, J, T>(columns: I, referenced_table: impl Into<String>, referenced_columns: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            constraint: None,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn constraint(mut self, name: impl Into<String>) -> Self {
        self.constraint = Some(name.into());
        self
    }

    /// Sets the `ON DELETE` action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the `ON UPDATE` action.
    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Returns `true` if the referencing columns equal `columns`, ignoring case.
    pub fn covers(&self, columns: &[&str]) -> bool {
        self.columns.len() == columns.len()
            && self
                .columns
                .iter()
                .zip(columns)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_sql() {
        assert_eq!(ForeignKeyAction::SetNull.as_sql(), "SET NULL");
        assert_eq!(ForeignKeyAction::NoAction.to_string(), "NO ACTION");
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("cascade".parse::<ForeignKeyAction>().unwrap(), ForeignKeyAction::Cascade);
        assert_eq!("set_null".parse::<ForeignKeyAction>().unwrap(), ForeignKeyAction::SetNull);
        assert_eq!(" NO ACTION ".parse::<ForeignKeyAction>().unwrap(), ForeignKeyAction::NoAction);
        assert!("explode".parse::<ForeignKeyAction>().is_err());
    }

    #[test]
    fn test_foreign_key_builder() {
        let fk = ForeignKey::new(["user_id"], "users", ["id"])
            .constraint("fk_posts_user")
            .on_delete(ForeignKeyAction::Cascade)
            .on_update(ForeignKeyAction::Restrict);
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_columns, vec!["id".to_string()]);
        assert_eq!(fk.constraint.as_deref(), Some("fk_posts_user"));
        assert!(fk.covers(&["USER_ID"]));
        assert!(!fk.covers(&["author_id"]));
    }
}
