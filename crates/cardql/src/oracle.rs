//! Oracle backend for cardql
//!
//! The `oracle` driver is blocking, so every call runs on
//! `tokio::task::spawn_blocking` against a connection behind a mutex.
//! Outside a transaction the connection runs with autocommit on. Beginning a
//! transaction switches autocommit off, which makes Oracle open one implicitly
//! at the first statement; commit or rollback switches it back on.

use async_trait::async_trait;
use oracle::sql_type::{OracleType, ToSql};
use oracle::SqlValue;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::{Connection, ConnectionFactory, DatabaseType, Transaction};
use crate::error::{Error, Result};
use crate::types::{ExecOutcome, Row, RowSet, Value};

type SharedConn = Arc<Mutex<oracle::Connection>>;

/// Owned bind parameter that can cross into a blocking task
type OwnedParam = Box<dyn ToSql + Send>;

fn value_to_param(value: &Value) -> OwnedParam {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(if *b { 1_i64 } else { 0_i64 }),
        Value::Int64(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        // NUMBER accepts a textual bind without losing precision
        Value::Decimal(d) => Box::new(d.to_string()),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(d.and_hms_opt(0, 0, 0).unwrap_or_default()),
        Value::DateTime(dt) => Box::new(*dt),
        Value::Array(_) | Value::Json(_) => Box::new(value.to_json().to_string()),
    }
}

fn sql_value_to_value(value: &SqlValue) -> oracle::Result<Value> {
    if value.is_null()? {
        return Ok(Value::Null);
    }

    let converted = match value.oracle_type()? {
        OracleType::Number(precision, scale)
            if *scale <= 0 && *precision > 0 && *precision < 19 =>
        {
            Value::Int64(value.get::<i64>()?)
        }
        OracleType::Number(_, _) | OracleType::Float(_) => {
            let text: String = value.get()?;
            match Decimal::from_str(&text) {
                Ok(d) => Value::Decimal(d),
                Err(_) => Value::Float64(value.get::<f64>()?),
            }
        }
        OracleType::BinaryFloat | OracleType::BinaryDouble => Value::Float64(value.get::<f64>()?),
        OracleType::Int64 | OracleType::UInt64 => Value::Int64(value.get::<i64>()?),
        OracleType::Date
        | OracleType::Timestamp(_)
        | OracleType::TimestampTZ(_)
        | OracleType::TimestampLTZ(_) => Value::DateTime(value.get::<chrono::NaiveDateTime>()?),
        OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => {
            Value::Bytes(value.get::<Vec<u8>>()?)
        }
        OracleType::Boolean => Value::Bool(value.get::<bool>()?),
        _ => Value::String(value.get::<String>()?),
    };
    Ok(converted)
}

fn statement_error(e: oracle::Error, sql: &str) -> Error {
    Error::Statement {
        message: e.to_string(),
        sql: Some(sql.to_string()),
        source: Some(Box::new(e)),
    }
}

fn run_query(conn: &oracle::Connection, sql: &str, params: &[OwnedParam]) -> Result<RowSet> {
    let binds: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
    let result_set = conn
        .query(sql, &binds)
        .map_err(|e| statement_error(e, sql))?;

    let fields: Vec<String> = result_set
        .column_info()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in result_set {
        let row = row.map_err(|e| statement_error(e, sql))?;
        let values = row
            .sql_values()
            .iter()
            .map(sql_value_to_value)
            .collect::<oracle::Result<Vec<Value>>>()
            .map_err(|e| Error::type_conversion(e.to_string()))?;
        rows.push(Row::new(fields.clone(), values));
    }

    Ok(RowSet::new(fields, rows))
}

fn run_execute(conn: &oracle::Connection, sql: &str, params: &[OwnedParam]) -> Result<ExecOutcome> {
    let binds: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
    let statement = conn
        .execute(sql, &binds)
        .map_err(|e| statement_error(e, sql))?;
    let affected = statement
        .row_count()
        .map_err(|e| statement_error(e, sql))?;
    // ROWID of the last touched row; absent for statements that touch none
    let insert_id = statement.last_row_id().ok().flatten();
    Ok(ExecOutcome {
        affected,
        insert_id,
    })
}

async fn blocking<T, F>(conn: &SharedConn, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut oracle::Connection) -> Result<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock();
        work(&mut guard)
    })
    .await
    .map_err(|e| Error::internal(format!("Oracle worker task failed: {}", e)))?
}

/// Oracle connection implementation
pub struct OracleConnection {
    conn: SharedConn,
    in_transaction: Arc<AtomicBool>,
}

impl OracleConnection {
    /// Connect with user credentials and an Easy Connect or TNS string
    pub async fn connect(user: &str, password: &str, connect_string: &str) -> Result<Self> {
        let (user, password, connect_string) = (
            user.to_string(),
            password.to_string(),
            connect_string.to_string(),
        );

        let conn = tokio::task::spawn_blocking(move || {
            let mut conn = oracle::Connection::connect(&user, &password, &connect_string)?;
            conn.set_autocommit(true);
            Ok::<_, oracle::Error>(conn)
        })
        .await
        .map_err(|e| Error::internal(format!("Oracle worker task failed: {}", e)))?
        .map_err(|e| Error::connection_with_source("Failed to connect to Oracle", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            in_transaction: Arc::new(AtomicBool::new(false)),
        })
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.in_transaction.load(Ordering::SeqCst) {
            return Err(Error::connection(
                "Connection is held by an open transaction",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for OracleConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.ensure_idle()?;
        let sql = sql.to_string();
        let params: Vec<OwnedParam> = params.iter().map(value_to_param).collect();
        blocking(&self.conn, move |conn| run_query(conn, &sql, &params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        self.ensure_idle()?;
        let sql = sql.to_string();
        let params: Vec<OwnedParam> = params.iter().map(value_to_param).collect();
        blocking(&self.conn, move |conn| run_execute(conn, &sql, &params)).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_idle()?;
        blocking(&self.conn, |conn| {
            conn.set_autocommit(false);
            Ok(())
        })
        .await?;
        self.in_transaction.store(true, Ordering::SeqCst);

        Ok(Box::new(OracleTransaction {
            conn: Arc::clone(&self.conn),
            in_transaction: Arc::clone(&self.in_transaction),
        }))
    }

    async fn is_valid(&self) -> bool {
        if self.in_transaction.load(Ordering::SeqCst) {
            return false;
        }
        blocking(&self.conn, |conn| {
            conn.ping()
                .map_err(|e| Error::connection_with_source("ping failed", e))
        })
        .await
        .is_ok()
    }

    async fn close(&self) -> Result<()> {
        blocking(&self.conn, |conn| {
            conn.close()
                .map_err(|e| Error::connection_with_source("Failed to close connection", e))
        })
        .await
    }
}

/// Oracle transaction
pub struct OracleTransaction {
    conn: SharedConn,
    in_transaction: Arc<AtomicBool>,
}

impl OracleTransaction {
    async fn finish(&self, commit: bool) -> Result<()> {
        let result = blocking(&self.conn, move |conn| {
            let outcome = if commit { conn.commit() } else { conn.rollback() };
            conn.set_autocommit(true);
            outcome.map_err(|e| {
                let action = if commit { "COMMIT" } else { "ROLLBACK" };
                Error::transaction_with_source(format!("{} failed", action), e)
            })
        })
        .await;

        self.in_transaction.store(false, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl Transaction for OracleTransaction {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let sql = sql.to_string();
        let params: Vec<OwnedParam> = params.iter().map(value_to_param).collect();
        blocking(&self.conn, move |conn| run_query(conn, &sql, &params)).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecOutcome> {
        let sql = sql.to_string();
        let params: Vec<OwnedParam> = params.iter().map(value_to_param).collect();
        blocking(&self.conn, move |conn| run_execute(conn, &sql, &params)).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish(true).await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish(false).await
    }
}

/// Oracle connection factory
pub struct OracleConnectionFactory {
    user: String,
    password: String,
    connect_string: String,
}

impl OracleConnectionFactory {
    /// Create a new Oracle connection factory
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        connect_string: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            connect_string: connect_string.into(),
        }
    }
}

impl std::fmt::Debug for OracleConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConnectionFactory")
            .field("user", &self.user)
            .field("password", &"***")
            .field("connect_string", &self.connect_string)
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for OracleConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let conn =
            OracleConnection::connect(&self.user, &self.password, &self.connect_string).await?;
        Ok(Box::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Oracle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_debug_hides_password() {
        let factory = OracleConnectionFactory::new("app", "s3cret", "db:1521/ORCLPDB1");
        let debug = format!("{:?}", factory);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("ORCLPDB1"));
    }
}
