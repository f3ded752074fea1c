//! Connection pool for cardql
//!
//! Every top-level operation borrows exactly one connection and holds it for
//! its whole duration. The `PooledConnection` guard hands the connection back
//! when dropped, so release happens on every exit path.
//!
//! # Example
//!
//! ```rust,ignore
//! use cardql::pool::{PoolConfig, SimpleConnectionPool};
//!
//! let pool = SimpleConnectionPool::new(PoolConfig::default(), factory).await?;
//! let conn = pool.get().await?;
//! conn.query("SELECT 1 FROM DUAL", &[]).await?;
//! // Connection is returned to pool when dropped
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};

/// Connection pool trait
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Get a connection from the pool
    async fn get(&self) -> Result<PooledConnection>;

    /// Return a connection to the pool
    async fn return_connection(&self, conn: Box<dyn Connection>, created_at: Instant);

    /// Get current pool size
    fn size(&self) -> usize;

    /// Get number of idle connections
    fn idle(&self) -> usize;

    /// Get pool statistics
    fn stats(&self) -> PoolStats;

    /// Close all connections and shutdown the pool
    async fn close(&self) -> Result<()>;
}

/// A connection borrowed from the pool
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    created_at: Instant,
    pool: Arc<dyn ConnectionPool>,
}

impl PooledConnection {
    /// Create a new pooled connection wrapper
    pub fn new(
        conn: Box<dyn Connection>,
        created_at: Instant,
        pool: Arc<dyn ConnectionPool>,
    ) -> Self {
        Self {
            conn: Some(conn),
            created_at,
            pool,
        }
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("connection already returned")
            .as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            let created_at = self.created_at;
            tokio::spawn(async move {
                pool.return_connection(conn, created_at).await;
            });
        }
    }
}

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Minimum pool size (connections opened eagerly)
    pub min_size: usize,
    /// Maximum pool size
    pub max_size: usize,
    /// Maximum time to wait for a connection
    #[serde(rename = "acquire_timeout_ms", with = "duration_ms")]
    pub acquire_timeout: Duration,
    /// Maximum connection lifetime (for recycling)
    #[serde(rename = "max_lifetime_ms", with = "duration_ms")]
    pub max_lifetime: Duration,
    /// Idle timeout (connections idle longer are closed)
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,
    /// Whether to test connections on borrow
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(1800), // 30 minutes
            idle_timeout: Duration::from_secs(600),  // 10 minutes
            test_on_borrow: true,
        }
    }
}

impl PoolConfig {
    /// Set minimum pool size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set maximum connection lifetime
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable/disable test on borrow
    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }

    /// Validate pool bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config("pool max_size must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(Error::config(format!(
                "pool min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections created
    pub connections_created: u64,
    /// Total number of connections closed
    pub connections_closed: u64,
    /// Total number of connection acquisitions
    pub acquisitions: u64,
    /// Number of times pool was exhausted
    pub exhausted_count: u64,
    /// Number of health check failures
    pub health_check_failures: u64,
}

/// Atomic pool stats for concurrent updates
#[derive(Debug, Default)]
struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    acquisitions: AtomicU64,
    exhausted_count: AtomicU64,
    health_check_failures: AtomicU64,
}

impl AtomicPoolStats {
    fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exhausted(&self) {
        self.exhausted_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhausted_count: self.exhausted_count.load(Ordering::Relaxed),
            health_check_failures: self.health_check_failures.load(Ordering::Relaxed),
        }
    }
}

/// Semaphore-bounded connection pool.
///
/// Idle connections are reused LIFO, validated on borrow when configured, and
/// recycled once they outlive `max_lifetime` or sit idle past `idle_timeout`.
pub struct SimpleConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<Vec<PoolEntry>>,
    idle_count: AtomicUsize,
    semaphore: Semaphore,
    total_connections: AtomicUsize,
    stats: AtomicPoolStats,
    shutdown: AtomicBool,
    self_ref: Weak<Self>,
}

struct PoolEntry {
    conn: Box<dyn Connection>,
    created_at: Instant,
    last_used: Instant,
}

impl SimpleConnectionPool {
    /// Create a new connection pool.
    ///
    /// Opens `min_size` connections eagerly; failures there are logged and
    /// left to the first `get`.
    pub async fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Arc<Self>> {
        config.validate()?;

        let pool = Arc::new_cyclic(|weak| Self {
            semaphore: Semaphore::new(config.max_size),
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            idle_count: AtomicUsize::new(0),
            config: config.clone(),
            factory,
            total_connections: AtomicUsize::new(0),
            stats: AtomicPoolStats::default(),
            shutdown: AtomicBool::new(false),
            self_ref: weak.clone(),
        });

        for _ in 0..config.min_size {
            match pool.create_connection().await {
                Ok(conn) => {
                    let now = Instant::now();
                    pool.push_idle(PoolEntry {
                        conn,
                        created_at: now,
                        last_used: now,
                    })
                    .await;
                }
                Err(e) => {
                    tracing::warn!("Failed to pre-open pooled connection: {}", e);
                    break;
                }
            }
        }

        Ok(pool)
    }

    async fn create_connection(&self) -> Result<Box<dyn Connection>> {
        let conn = self.factory.connect().await?;
        self.total_connections.fetch_add(1, Ordering::Release);
        self.stats.record_created();
        Ok(conn)
    }

    async fn push_idle(&self, entry: PoolEntry) {
        let mut idle = self.idle.lock().await;
        idle.push(entry);
        self.idle_count.store(idle.len(), Ordering::Release);
    }

    fn discard(&self) {
        self.total_connections.fetch_sub(1, Ordering::Release);
        self.stats.record_closed();
    }

    fn should_recycle(&self, created_at: Instant, last_used: Instant) -> bool {
        created_at.elapsed() > self.config.max_lifetime
            || last_used.elapsed() > self.config.idle_timeout
    }

    /// Get pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl ConnectionPool for SimpleConnectionPool {
    async fn get(&self) -> Result<PooledConnection> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::PoolExhausted {
                message: "Pool is shut down".to_string(),
            });
        }

        let permit = tokio::time::timeout(self.config.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| {
                self.stats.record_exhausted();
                Error::PoolExhausted {
                    message: format!(
                        "Timeout waiting for connection ({}ms)",
                        self.config.acquire_timeout.as_millis()
                    ),
                }
            })?
            .map_err(|_| Error::PoolExhausted {
                message: "Pool semaphore closed".to_string(),
            })?;

        let reused = {
            let mut idle = self.idle.lock().await;
            let mut found = None;
            while let Some(entry) = idle.pop() {
                if self.should_recycle(entry.created_at, entry.last_used) {
                    let _ = entry.conn.close().await;
                    self.discard();
                    continue;
                }
                if self.config.test_on_borrow && !entry.conn.is_valid().await {
                    self.discard();
                    self.stats.record_health_check_failure();
                    continue;
                }
                found = Some((entry.conn, entry.created_at));
                break;
            }
            self.idle_count.store(idle.len(), Ordering::Release);
            found
        };

        // A failed connect drops the permit on return.
        let (conn, created_at) = match reused {
            Some(found) => found,
            None => (self.create_connection().await?, Instant::now()),
        };

        self.stats.record_acquisition();

        // Released in return_connection
        permit.forget();

        let pool: Arc<dyn ConnectionPool> = match self.self_ref.upgrade() {
            Some(pool) => pool as Arc<dyn ConnectionPool>,
            None => {
                self.semaphore.add_permits(1);
                return Err(Error::PoolExhausted {
                    message: "Pool has been dropped".to_string(),
                });
            }
        };

        Ok(PooledConnection::new(conn, created_at, pool))
    }

    async fn return_connection(&self, conn: Box<dyn Connection>, created_at: Instant) {
        self.semaphore.add_permits(1);

        if self.shutdown.load(Ordering::Acquire) {
            let _ = conn.close().await;
            self.discard();
            return;
        }

        self.push_idle(PoolEntry {
            conn,
            created_at,
            last_used: Instant::now(),
        })
        .await;
    }

    fn size(&self) -> usize {
        self.total_connections.load(Ordering::Acquire)
    }

    fn idle(&self) -> usize {
        self.idle_count.load(Ordering::Acquire)
    }

    fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);

        let mut idle = self.idle.lock().await;
        for entry in idle.drain(..) {
            let _ = entry.conn.close().await;
            self.discard();
        }
        self.idle_count.store(0, Ordering::Release);

        Ok(())
    }
}
