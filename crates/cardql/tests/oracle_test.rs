//! Live Oracle tests
//!
//! Run with: `CARDQL_TEST_ORACLE_CONNECT=host:1521/FREEPDB1 CARDQL_TEST_ORACLE_USER=app
//! CARDQL_TEST_ORACLE_PASSWORD=... cargo test -p cardql --features oracle --test oracle_test`

#![cfg(feature = "oracle")]

use cardql::oracle::OracleConnectionFactory;
use cardql::prelude::*;

fn factory() -> Option<OracleConnectionFactory> {
    let connect_string = std::env::var("CARDQL_TEST_ORACLE_CONNECT").ok()?;
    let user = std::env::var("CARDQL_TEST_ORACLE_USER").ok()?;
    let password = std::env::var("CARDQL_TEST_ORACLE_PASSWORD").unwrap_or_default();
    Some(OracleConnectionFactory::new(user, password, connect_string))
}

#[tokio::test]
async fn test_insert_reports_rowid() {
    let Some(factory) = factory() else {
        eprintln!("CARDQL_TEST_ORACLE_CONNECT not set, skipping");
        return;
    };
    let conn = factory.connect().await.unwrap();

    let _ = conn.execute("DROP TABLE CARDQL_ROWID_T", &[]).await;
    conn.execute("CREATE TABLE CARDQL_ROWID_T (ID VARCHAR2(32))", &[])
        .await
        .unwrap();

    let inserted = conn
        .execute("INSERT INTO CARDQL_ROWID_T (ID) VALUES (:1)", &["A1".into()])
        .await
        .unwrap();
    assert_eq!(inserted.affected, 1);
    let rowid = inserted.insert_id.expect("insert reports a ROWID");
    assert_eq!(rowid.len(), 18);

    let missed = conn
        .execute("DELETE FROM CARDQL_ROWID_T WHERE ID=:1", &["B2".into()])
        .await
        .unwrap();
    assert_eq!(missed.affected, 0);

    conn.execute("DROP TABLE CARDQL_ROWID_T", &[]).await.unwrap();
}
