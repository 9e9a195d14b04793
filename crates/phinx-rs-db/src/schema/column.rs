//! Column definitions and abstract column types.

use std::fmt;
use std::str::FromStr;

use phinx_rs_core::PhinxError;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The dialect-neutral column types.
///
/// Each adapter maps these onto its native types with `sql_type` and back
/// again with `phinx_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length string, `limit` is the maximum length.
    String,
    /// Fixed-length string.
    Char,
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Floating-point number.
    Float,
    /// Exact numeric with precision and scale.
    Decimal {
        /// Total number of digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Date and time without zone.
    DateTime,
    /// Timestamp.
    Timestamp,
    /// Time of day.
    Time,
    /// Calendar date.
    Date,
    /// Binary data.
    Binary,
    /// Boolean flag.
    Boolean,
    /// UUID.
    Uuid,
    /// JSON document.
    Json,
}

impl ColumnType {
    /// Every abstract type name, in declaration order.
    pub const ALL_NAMES: &'static [&'static str] = &[
        "string",
        "char",
        "text",
        "integer",
        "biginteger",
        "float",
        "decimal",
        "datetime",
        "timestamp",
        "time",
        "date",
        "binary",
        "boolean",
        "uuid",
        "json",
    ];

    /// Returns the abstract type name, e.g. `"biginteger"`.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Char => "char",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::BigInteger => "biginteger",
            Self::Float => "float",
            Self::Decimal { .. } => "decimal",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Time => "time",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Json => "json",
        }
    }

    /// Returns `true` for integer types that can back an identity column.
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInteger)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ColumnType {
    type Err = PhinxError;

    /// Parses an abstract type name. `decimal` without arguments gets
    /// precision 10 and scale 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if let Some(args) = lower
            .strip_prefix("decimal(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let mut parts = args.split(',').map(str::trim);
            let precision = parts.next().and_then(|p| p.parse().ok());
            let scale = parts.next().map_or(Some(0), |p| p.parse().ok());
            return match (precision, scale, parts.next()) {
                (Some(precision), Some(scale), None) => Ok(Self::Decimal { precision, scale }),
                _ => Err(PhinxError::UnsupportedType(s.to_string())),
            };
        }

        Ok(match lower.as_str() {
            "string" => Self::String,
            "char" => Self::Char,
            "text" => Self::Text,
            "integer" => Self::Integer,
            "biginteger" => Self::BigInteger,
            "float" => Self::Float,
            "decimal" => Self::Decimal {
                precision: 10,
                scale: 0,
            },
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            "time" => Self::Time,
            "date" => Self::Date,
            "binary" => Self::Binary,
            "boolean" => Self::Boolean,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            _ => return Err(PhinxError::UnsupportedType(s.to_string())),
        })
    }
}

/// A column default: a literal value or a raw SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// A literal, rendered as a quoted/escaped SQL literal.
    Value(Value),
    /// A raw SQL expression such as `CURRENT_TIMESTAMP`, rendered verbatim.
    Expression(String),
}

impl From<Value> for ColumnDefault {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// A column definition.
///
/// # Examples
///
/// ```
/// use phinx_rs_db::{Column, ColumnType};
///
/// let email = Column::new("email", ColumnType::String).limit(120).nullable();
/// assert_eq!(email.limit, Some(120));
/// assert!(email.null);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Abstract type.
    pub column_type: ColumnType,
    /// Length limit, when the type takes one.
    pub limit: Option<u32>,
    /// Whether NULL is allowed.
    pub null: bool,
    /// Default value.
    pub default: Option<ColumnDefault>,
    /// Auto-incrementing primary key.
    pub identity: bool,
    /// Free-form comment.
    pub comment: Option<String>,
}

impl Column {
    /// Creates a NOT NULL column with no default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            limit: None,
            null: false,
            default: None,
            identity: false,
            comment: None,
        }
    }

    /// Sets the length limit.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Allows NULL values.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets a literal default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    /// Sets a raw SQL expression as the default.
    #[must_use]
    pub fn default_expression(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expr.into()));
        self
    }

    /// Marks the column as an auto-incrementing primary key.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
