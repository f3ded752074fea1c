//! Database handle and transaction manager
//!
//! A [`Database`] pairs a connection pool with the dialect of its backend.
//! Callers hand it canonical SQL (`?` placeholders, `SYSDATE()`); it renders
//! the native form, runs it on one pooled connection and logs the outcome.
//!
//! [`Database::trans`] runs a unit of work inside one transaction. The work
//! receives an [`Executor`] bound to that transaction; once `trans` returns,
//! the executor is detached and any copy that escaped fails.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::DatabaseConfig;
use crate::connection::{DatabaseType, Transaction};
use crate::dialect::{dialect_for, SqlDialect};
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, SimpleConnectionPool};
use crate::types::{ExecOutcome, RowSet, Value};

/// A named backend: connection pool plus dialect
pub struct Database {
    name: Arc<str>,
    dialect: Arc<dyn SqlDialect>,
    pool: Arc<dyn ConnectionPool>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("dialect", &self.dialect.name())
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl Database {
    /// Create a database handle over an existing pool
    pub fn new(
        name: impl Into<String>,
        dialect: Arc<dyn SqlDialect>,
        pool: Arc<dyn ConnectionPool>,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            dialect,
            pool,
        }
    }

    /// Open the pool described by a configuration entry
    pub async fn connect(name: impl Into<String>, config: &DatabaseConfig) -> Result<Self> {
        let factory = config.connection_factory()?;
        let pool = SimpleConnectionPool::new(config.pool().clone(), factory).await?;
        Ok(Self::new(name, dialect_for(config.database_type()), pool))
    }

    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dialect of the backend
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Backend type
    pub fn database_type(&self) -> DatabaseType {
        self.dialect.database_type()
    }

    /// Underlying pool
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// Run a row-returning statement with autocommit
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let native = self.dialect.render(sql);
        let conn = self.pool.get().await?;
        let start = Instant::now();
        let result = conn.query(&native, params).await;
        let count = result.as_ref().map(|r| r.rows.len());
        log_statement(&self.name, &native, params, start, count);
        result
    }

    /// Run a data-modifying statement with autocommit
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let native = self.dialect.render(sql);
        let conn = self.pool.get().await?;
        let start = Instant::now();
        let result = conn.execute(&native, params).await;
        let count = result.as_ref().map(|o| o.affected as usize);
        log_statement(&self.name, &native, params, start, count);
        result
    }

    /// Run `work` inside one transaction.
    ///
    /// Commits when `work` succeeds. On failure the transaction is rolled
    /// back first; a statement failure then surfaces as
    /// [`Error::Transaction`] with the statement error as its source, any
    /// other error surfaces unchanged.
    pub async fn trans<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce(Executor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.pool.get().await?;

        debug!(
            database = %self.name,
            begin = self.dialect.begin_statement().unwrap_or("<implicit>"),
            "start transaction"
        );
        let tx = conn.begin().await?;

        let slot = Arc::new(Mutex::new(Some(tx)));
        let executor = Executor {
            slot: Arc::clone(&slot),
            dialect: Arc::clone(&self.dialect),
            database: Arc::clone(&self.name),
        };

        let outcome = work(executor).await;

        let tx = slot
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::internal("transaction detached before completion"))?;

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                debug!(database = %self.name, "commit transaction");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(database = %self.name, error = %rollback_err, "rollback failed");
                }
                debug!(database = %self.name, "rollback transaction");
                match e {
                    Error::Statement { .. } => Err(Error::transaction_with_source(
                        "rolled back after statement failure",
                        e,
                    )),
                    other => Err(other),
                }
            }
        }
    }

    /// Close every pooled connection
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await
    }
}

/// Statement capability scoped to one transaction.
///
/// Statements issued through clones of one executor run one at a time on the
/// transaction's connection.
#[derive(Clone)]
pub struct Executor {
    slot: Arc<Mutex<Option<Box<dyn Transaction>>>>,
    dialect: Arc<dyn SqlDialect>,
    database: Arc<str>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("database", &self.database)
            .field("dialect", &self.dialect.name())
            .finish()
    }
}

impl Executor {
    /// Dialect of the transaction's backend
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Run a row-returning statement in the transaction
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let native = self.dialect.render(sql);
        let guard = self.slot.lock().await;
        let tx = guard.as_ref().ok_or_else(detached)?;
        let start = Instant::now();
        let result = tx.query(&native, params).await;
        let count = result.as_ref().map(|r| r.rows.len());
        log_statement(&self.database, &native, params, start, count);
        result
    }

    /// Run a data-modifying statement in the transaction
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let native = self.dialect.render(sql);
        let guard = self.slot.lock().await;
        let tx = guard.as_ref().ok_or_else(detached)?;
        let start = Instant::now();
        let result = tx.execute(&native, params).await;
        let count = result.as_ref().map(|o| o.affected as usize);
        log_statement(&self.database, &native, params, start, count);
        result
    }
}

fn detached() -> Error {
    Error::transaction("executor used after its transaction finished")
}

fn log_statement(
    database: &str,
    sql: &str,
    params: &[Value],
    start: Instant,
    outcome: std::result::Result<usize, &Error>,
) {
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    match outcome {
        Ok(count) => debug!(database, sql, ?params, count, elapsed_ms, "statement"),
        Err(e) => error!(database, sql, ?params, elapsed_ms, error = %e, "statement failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnectionFactory, MockResponse};
    use crate::types::Row;

    async fn mock_db(factory: Arc<MockConnectionFactory>) -> Database {
        let pool = SimpleConnectionPool::new(Default::default(), factory)
            .await
            .unwrap();
        Database::new("default", dialect_for(DatabaseType::Oracle), pool)
    }

    #[tokio::test]
    async fn test_query_renders_native_sql() {
        let factory = Arc::new(MockConnectionFactory::new(DatabaseType::Oracle));
        factory.respond(|_, _| {
            Ok(MockResponse::Rows(vec![Row::new(
                vec!["C0".into()],
                vec![Value::from("A")],
            )]))
        });
        let db = mock_db(factory.clone()).await;

        let rows = db
            .query("SELECT T0.ID C0 FROM A T0 WHERE T0.ID=?", &["A".into()])
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(
            factory.statements()[0].sql,
            "SELECT T0.ID C0 FROM A T0 WHERE T0.ID=:1"
        );
    }

    #[tokio::test]
    async fn test_trans_commits_on_success() {
        let factory = Arc::new(MockConnectionFactory::new(DatabaseType::Oracle));
        let db = mock_db(factory.clone()).await;

        let affected = db
            .trans(|tx| async move {
                let outcome = tx.execute("DELETE FROM A WHERE ID=?", &["X".into()]).await?;
                Ok(outcome.affected)
            })
            .await
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(factory.commits(), 1);
        assert_eq!(factory.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_statement_failure_rolls_back_as_transaction_error() {
        let factory = Arc::new(MockConnectionFactory::new(DatabaseType::Oracle));
        factory.respond(|sql, _| {
            if sql.starts_with("INSERT") {
                Err(Error::statement_with_sql("ORA-00001: unique constraint", sql))
            } else {
                Ok(MockResponse::Affected(1))
            }
        });
        let db = mock_db(factory.clone()).await;

        let err = db
            .trans(|tx| async move {
                tx.execute("UPDATE A SET MC=? WHERE ID=?", &["n".into(), "1".into()])
                    .await?;
                tx.execute("INSERT INTO A (ID) VALUES (?)", &["1".into()])
                    .await?;
                Ok(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.category(), crate::error::ErrorCategory::Transaction);
        assert_eq!(factory.commits(), 0);
        assert_eq!(factory.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_after_rollback() {
        let factory = Arc::new(MockConnectionFactory::new(DatabaseType::MySQL));
        let db = mock_db(factory.clone()).await;

        let err = db
            .trans(|_tx| async move { Err::<(), _>(Error::card_not_found("Ghost")) })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CardNotFound { .. }));
        assert_eq!(factory.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_escaped_executor_is_detached() {
        let factory = Arc::new(MockConnectionFactory::new(DatabaseType::MySQL));
        let db = mock_db(factory).await;

        let escaped = db.trans(|tx| async move { Ok(tx) }).await.unwrap();
        let err = escaped.execute("DELETE FROM A", &[]).await.unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Transaction);
    }
}
