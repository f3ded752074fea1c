//! Testing utilities
//!
//! A scripted backend that records every native statement and answers through
//! a caller-supplied handler, so compilers and coordinators can be exercised
//! without a live database.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardql::testing::{MockConnectionFactory, MockResponse};
//!
//! let factory = Arc::new(MockConnectionFactory::new(DatabaseType::MySQL));
//! factory.respond(|sql, _params| {
//!     if sql.starts_with("UPDATE") {
//!         Ok(MockResponse::Affected(0))
//!     } else {
//!         Ok(MockResponse::Affected(1))
//!     }
//! });
//!
//! let pool = SimpleConnectionPool::new(PoolConfig::default(), factory.clone()).await?;
//! let db = Database::new("default", dialect_for(DatabaseType::MySQL), pool);
//! // ... run operations ...
//! assert_eq!(factory.statements().len(), 2);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionFactory, DatabaseType, Transaction};
use crate::error::{Error, Result};
use crate::types::{ExecOutcome, Row, RowSet, Value};

/// Scripted answer to one statement
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Rows for a query (an `execute` reports the row count as affected)
    Rows(Vec<Row>),
    /// Affected-row count (a `query` gets no rows)
    Affected(u64),
}

impl MockResponse {
    /// Build a row response from column names and value lists
    pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Self::Rows(
            rows.into_iter()
                .map(|values| Row::new(columns.clone(), values))
                .collect(),
        )
    }
}

/// A statement seen by the mock backend
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Native SQL text
    pub sql: String,
    /// Bound parameters in order
    pub params: Vec<Value>,
    /// Whether it ran inside a transaction
    pub in_transaction: bool,
}

type Handler = Arc<dyn Fn(&str, &[Value]) -> Result<MockResponse> + Send + Sync>;

#[derive(Default)]
struct MockState {
    statements: Vec<ExecutedStatement>,
    handler: Option<Handler>,
    connections: usize,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    fail_connect: Option<String>,
}

impl MockState {
    fn run(
        state: &Mutex<MockState>,
        sql: &str,
        params: &[Value],
        in_transaction: bool,
    ) -> Result<MockResponse> {
        let handler = {
            let mut guard = state.lock();
            guard.statements.push(ExecutedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
                in_transaction,
            });
            guard.handler.clone()
        };

        match handler {
            Some(handler) => handler(sql, params),
            None => Ok(MockResponse::Affected(1)),
        }
    }
}

fn into_rows(response: MockResponse) -> RowSet {
    match response {
        MockResponse::Rows(rows) => RowSet::from_rows(rows),
        MockResponse::Affected(_) => RowSet::default(),
    }
}

fn into_outcome(response: MockResponse) -> ExecOutcome {
    match response {
        MockResponse::Rows(rows) => ExecOutcome::affected(rows.len() as u64),
        MockResponse::Affected(n) => ExecOutcome::affected(n),
    }
}

/// A mock connection factory for testing
pub struct MockConnectionFactory {
    database_type: DatabaseType,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnectionFactory")
            .field("database_type", &self.database_type)
            .finish()
    }
}

impl MockConnectionFactory {
    /// Create a mock backend of the given type.
    ///
    /// Without a handler every query returns no rows and every other
    /// statement reports one affected row.
    pub fn new(database_type: DatabaseType) -> Self {
        Self {
            database_type,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Answer statements through `handler`
    pub fn respond<F>(&self, handler: F)
    where
        F: Fn(&str, &[Value]) -> Result<MockResponse> + Send + Sync + 'static,
    {
        self.state.lock().handler = Some(Arc::new(handler));
    }

    /// Make every new connection attempt fail
    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().fail_connect = Some(message.into());
    }

    /// Statements executed so far, in order
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.state.lock().statements.clone()
    }

    /// Forget recorded statements and counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.statements.clear();
        state.begins = 0;
        state.commits = 0;
        state.rollbacks = 0;
    }

    /// Connections opened
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Transactions started
    pub fn begins(&self) -> usize {
        self.state.lock().begins
    }

    /// Transactions committed
    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }

    /// Transactions rolled back
    pub fn rollbacks(&self) -> usize {
        self.state.lock().rollbacks
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        if let Some(message) = &state.fail_connect {
            return Err(Error::connection(message.clone()));
        }
        state.connections += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        self.database_type
    }
}

/// A connection to the mock backend
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        MockState::run(&self.state, sql, params, false).map(into_rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        MockState::run(&self.state, sql, params, false).map(into_outcome)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.state.lock().begins += 1;
        Ok(Box::new(MockTransaction {
            state: Arc::clone(&self.state),
        }))
    }

    async fn is_valid(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A transaction on the mock backend
pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        MockState::run(&self.state, sql, params, true).map(into_rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        MockState::run(&self.state, sql, params, true).map(into_outcome)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.state.lock().commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().rollbacks += 1;
        Ok(())
    }
}
