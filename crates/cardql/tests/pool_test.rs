//! Tests for the cardql connection pool

use cardql::prelude::*;
use cardql::testing::MockConnectionFactory;
use std::sync::Arc;
use std::time::Duration;

fn factory() -> Arc<MockConnectionFactory> {
    Arc::new(MockConnectionFactory::new(DatabaseType::MySQL))
}

async fn wait_idle(pool: &SimpleConnectionPool, expected: usize) {
    for _ in 0..100 {
        if pool.idle() == expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("pool never reached {} idle connections", expected);
}

#[tokio::test]
async fn test_min_size_opens_eagerly() {
    let factory = factory();
    let pool = SimpleConnectionPool::new(PoolConfig::default().with_min_size(2), factory.clone())
        .await
        .unwrap();

    assert_eq!(factory.connections(), 2);
    assert_eq!(pool.size(), 2);
    assert_eq!(pool.idle(), 2);
}

#[tokio::test]
async fn test_connection_is_reused_after_drop() {
    let factory = factory();
    let pool = SimpleConnectionPool::new(PoolConfig::default().with_min_size(0), factory.clone())
        .await
        .unwrap();

    {
        let conn = pool.get().await.unwrap();
        conn.execute("DELETE FROM RY WHERE ID=?", &["A".into()])
            .await
            .unwrap();
    }
    wait_idle(&pool, 1).await;

    let _conn = pool.get().await.unwrap();
    assert_eq!(factory.connections(), 1);
    assert_eq!(pool.stats().acquisitions, 2);
    assert_eq!(pool.stats().connections_created, 1);
}

#[tokio::test]
async fn test_exhausted_pool_times_out() {
    let config = PoolConfig::default()
        .with_min_size(0)
        .with_max_size(1)
        .with_acquire_timeout(Duration::from_millis(20));
    let pool = SimpleConnectionPool::new(config, factory()).await.unwrap();

    let _held = pool.get().await.unwrap();
    let err = pool.get().await.err().unwrap();
    assert_eq!(err.category(), ErrorCategory::PoolExhausted);
    assert_eq!(pool.stats().exhausted_count, 1);
}

#[tokio::test]
async fn test_connect_failure_surfaces() {
    let factory = factory();
    factory.fail_connect("connection refused");
    let pool = SimpleConnectionPool::new(PoolConfig::default(), factory.clone())
        .await
        .unwrap();
    assert_eq!(pool.size(), 0);

    let err = pool.get().await.err().unwrap();
    assert_eq!(err.category(), ErrorCategory::Connection);
}

#[tokio::test]
async fn test_closed_pool_refuses_connections() {
    let pool = SimpleConnectionPool::new(PoolConfig::default(), factory())
        .await
        .unwrap();
    pool.close().await.unwrap();

    assert_eq!(pool.idle(), 0);
    let err = pool.get().await.err().unwrap();
    assert_eq!(err.category(), ErrorCategory::PoolExhausted);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let result = SimpleConnectionPool::new(PoolConfig::default().with_max_size(0), factory()).await;
    assert!(result.is_err());
}
