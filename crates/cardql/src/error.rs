//! Error types for cardql
//!
//! Errors are split by who can act on them:
//! - Caller errors (unknown card, unresolvable path, unsupported operator)
//! - Backend errors (statement, transaction, connection, pool)
//! - Setup errors (configuration, unregistered backend)

use std::fmt;
use thiserror::Error;

/// Result type for cardql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Card descriptor missing from the metadata store
    NotFound,
    /// Model, filter or order path could not be resolved
    Path,
    /// Filter operator not understood
    Operator,
    /// No backend registered under the resolved name
    Backend,
    /// Statement execution failed
    Statement,
    /// Transaction rolled back or failed to complete
    Transaction,
    /// Connection-related errors
    Connection,
    /// Pool exhausted or shut down
    PoolExhausted,
    /// Timeout waiting on the backend
    Timeout,
    /// Configuration error
    Configuration,
    /// Invalid input shape
    Input,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether the caller supplied something the schema cannot satisfy
    #[inline]
    pub const fn is_caller_error(self) -> bool {
        matches!(self, Self::NotFound | Self::Path | Self::Operator | Self::Input)
    }
}

/// Main error type for cardql
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// No card with this name exists in the descriptor store
    #[error("card not found: {name}")]
    CardNotFound { name: String },

    /// A dotted path did not resolve against the card graph
    #[error("path '{path}' cannot be resolved on card '{card}': unknown segment '{segment}'")]
    PathResolution {
        path: String,
        card: String,
        segment: String,
    },

    /// A filter triple used an operator outside the supported set
    #[error("operator is not supported: {operator}")]
    UnsupportedOperator { operator: String },

    /// No database registered under the requested name
    #[error("no database named '{name}'")]
    UnregisteredBackend { name: String },

    /// Statement execution failed
    #[error("statement error: {message}")]
    Statement {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction rolled back, or begin/commit/rollback failed
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection pool exhausted
    #[error("pool exhausted: {message}")]
    PoolExhausted { message: String },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Malformed request (records, options, filter shape)
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Unsupported operation for this backend
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CardNotFound { .. } => ErrorCategory::NotFound,
            Self::PathResolution { .. } => ErrorCategory::Path,
            Self::UnsupportedOperator { .. } => ErrorCategory::Operator,
            Self::UnregisteredBackend { .. } => ErrorCategory::Backend,
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::TypeConversion { .. } | Self::InvalidArgument { .. } => ErrorCategory::Input,
            Self::Unsupported { .. } | Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Create a card-not-found error
    pub fn card_not_found(name: impl Into<String>) -> Self {
        Self::CardNotFound { name: name.into() }
    }

    /// Create a path resolution error
    pub fn path(
        path: impl Into<String>,
        card: impl Into<String>,
        segment: impl Into<String>,
    ) -> Self {
        Self::PathResolution {
            path: path.into(),
            card: card.into(),
            segment: segment.into(),
        }
    }

    /// Create an unsupported-operator error
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    /// Create an unregistered-backend error
    pub fn unregistered(name: impl Into<String>) -> Self {
        Self::UnregisteredBackend { name: name.into() }
    }

    /// Create a statement error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a statement error carrying the failing SQL
    pub fn statement_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transaction error wrapping the error that caused the rollback
    pub fn transaction_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The SQL text attached to a statement error, if any
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Path => write!(f, "path"),
            Self::Operator => write!(f, "operator"),
            Self::Backend => write!(f, "backend"),
            Self::Statement => write!(f, "statement"),
            Self::Transaction => write!(f, "transaction"),
            Self::Connection => write!(f, "connection"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Timeout => write!(f, "timeout"),
            Self::Configuration => write!(f, "configuration"),
            Self::Input => write!(f, "input"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_error_categories() {
        assert!(ErrorCategory::NotFound.is_caller_error());
        assert!(ErrorCategory::Path.is_caller_error());
        assert!(ErrorCategory::Operator.is_caller_error());

        assert!(!ErrorCategory::Statement.is_caller_error());
        assert!(!ErrorCategory::Transaction.is_caller_error());
        assert!(!ErrorCategory::Backend.is_caller_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::card_not_found("Customer");
        assert_eq!(err.to_string(), "card not found: Customer");

        let err = Error::path("owner.dept", "Order", "dept");
        assert!(err.to_string().contains("owner.dept"));
        assert!(err.to_string().contains("'dept'"));

        let err = Error::statement_with_sql("syntax error", "SELEC 1");
        assert!(err.to_string().contains("syntax error"));
        assert_eq!(err.sql(), Some("SELEC 1"));
    }

    #[test]
    fn test_transaction_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::transaction_with_source("rolled back", Error::statement("duplicate key"));
        assert_eq!(err.category(), ErrorCategory::Transaction);
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("statement error: duplicate key"));
    }
}
