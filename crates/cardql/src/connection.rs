//! Connection traits for cardql
//!
//! Core abstractions over a backend driver:
//! - Connection: statement execution with per-statement autocommit
//! - Transaction: statements on one connection, finished by commit or rollback
//! - ConnectionFactory: creates connections for a pool
//!
//! Statements reaching these traits are already in the backend's native
//! syntax; placeholder and timestamp rewriting happens in the dialect.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecOutcome, RowSet, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet>;

    /// Execute a statement that modifies data
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome>;

    /// Begin a transaction on this connection
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Check if connection is valid/alive
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// A database transaction
///
/// Statements run on the connection that began the transaction. Dropping a
/// transaction without finishing it leaves the outcome to the backend, so
/// callers always end with `commit` or `rollback`.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet>;

    /// Execute a statement that modifies data
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Get the database type
    fn database_type(&self) -> DatabaseType;
}

/// Database type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// MySQL/MariaDB
    MySQL,
    /// Oracle
    Oracle,
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySQL => write!(f, "MySQL"),
            Self::Oracle => write!(f, "Oracle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_display() {
        assert_eq!(format!("{}", DatabaseType::MySQL), "MySQL");
        assert_eq!(format!("{}", DatabaseType::Oracle), "Oracle");
    }
}
