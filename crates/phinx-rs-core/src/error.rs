//! Core error types for phinx-rs.
//!
//! Every adapter reports failures through the single [`PhinxError`] enum so
//! that the migration runner can react uniformly regardless of the database
//! engine underneath. Driver-specific errors are mapped into this taxonomy at
//! the adapter boundary and never leak out.

use thiserror::Error;

/// The primary error type for phinx-rs.
///
/// Variants fall into four groups: connection and driver availability,
/// statement execution, schema definition and type mapping, and the
/// surrounding configuration and migration runner.
#[derive(Error, Debug)]
pub enum PhinxError {
    // ── Connection ───────────────────────────────────────────────────

    /// The database engine is known, but its driver was not compiled in.
    #[error("Driver unavailable: {0}")]
    DriverUnavailable(String),

    /// Establishing a session with the database failed.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Human-readable description from the driver.
        message: String,
        /// The native error code, when the driver reports one.
        code: Option<String>,
    },

    // ── Execution ────────────────────────────────────────────────────

    /// A statement was rejected or failed while executing.
    ///
    /// The offending SQL is always carried along for diagnostics.
    #[error("Query error: {message} [{sql}]")]
    QueryError {
        /// Human-readable description from the driver.
        message: String,
        /// The native error code (SQLSTATE, extended result code, ...).
        code: Option<String>,
        /// The statement that failed.
        sql: String,
    },

    /// A transaction operation was used incorrectly.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// A result row could not be decoded into the requested type.
    #[error("Data error: {0}")]
    DataError(String),

    // ── Schema ───────────────────────────────────────────────────────

    /// No mapping exists between an abstract type and a native type.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// The adapter does not implement the requested operation.
    #[error("{adapter} adapter does not implement {operation}")]
    NotImplemented {
        /// The adapter name (e.g. "pgsql").
        adapter: String,
        /// The operation name (e.g. "`add_column`").
        operation: String,
    },

    /// A schema object cannot be rendered or applied as described.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Migrations ───────────────────────────────────────────────────

    /// The migration runner could not plan or execute a migration.
    #[error("Migration error: {0}")]
    MigrationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PhinxError {
    /// Builds a [`PhinxError::QueryError`] for the given statement.
    pub fn query(message: impl Into<String>, code: Option<String>, sql: impl Into<String>) -> Self {
        Self::QueryError {
            message: message.into(),
            code,
            sql: sql.into(),
        }
    }

    /// Builds a [`PhinxError::ConnectionError`].
    pub fn connection(message: impl Into<String>, code: Option<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            code,
        }
    }

    /// Builds a [`PhinxError::NotImplemented`] for an adapter operation.
    pub fn not_implemented(adapter: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            adapter: adapter.into(),
            operation: operation.into(),
        }
    }

    /// Returns the native error code carried by connection and query errors.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            Self::ConnectionError { code, .. } | Self::QueryError { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Returns the SQL that failed, for query errors.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::QueryError { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Returns `true` if this error reports a capability gap of the adapter.
    pub const fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}

/// A convenience type alias for `Result<T, PhinxError>`.
pub type PhinxResult<T> = Result<T, PhinxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_carries_sql_and_code() {
        let err = PhinxError::query("no such table: foo", Some("1".into()), "SELECT * FROM foo");
        assert_eq!(err.sql(), Some("SELECT * FROM foo"));
        assert_eq!(err.native_code(), Some("1"));
        assert_eq!(
            err.to_string(),
            "Query error: no such table: foo [SELECT * FROM foo]"
        );
    }

    #[test]
    fn test_connection_error_code() {
        let err = PhinxError::connection("refused", Some("08001".into()));
        assert_eq!(err.native_code(), Some("08001"));
        assert!(err.sql().is_none());
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_not_implemented() {
        let err = PhinxError::not_implemented("pgsql", "add_column");
        assert!(err.is_not_implemented());
        assert_eq!(err.to_string(), "pgsql adapter does not implement add_column");
        assert!(!PhinxError::UnsupportedType("geometry".into()).is_not_implemented());
    }

    #[test]
    fn test_other_variants_have_no_native_code() {
        assert!(PhinxError::DriverUnavailable("sqlite".into()).native_code().is_none());
        assert!(PhinxError::TransactionError("x".into()).sql().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: PhinxError = io_err.into();
        assert!(matches!(err, PhinxError::IoError(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
